use bytes::{BufMut, Bytes, BytesMut};

use super::transport::UploadForm;

/// Encode a form as `multipart/form-data`
///
/// Returns the `Content-Type` header value (carrying the boundary) and the
/// body. Text fields come first, the file part last.
pub fn encode(form: &UploadForm, boundary: &str) -> (String, Bytes) {
    let mut body = BytesMut::with_capacity(form.payload.len() + 512);

    for (name, value) in &form.fields {
        body.put_slice(format!("--{boundary}\r\n").as_bytes());
        body.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                quote(name)
            )
            .as_bytes(),
        );
        body.put_slice(value.as_bytes());
        body.put_slice(b"\r\n");
    }

    body.put_slice(format!("--{boundary}\r\n").as_bytes());
    body.put_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            quote(&form.file_field),
            quote(&form.filename)
        )
        .as_bytes(),
    );
    body.put_slice(format!("Content-Type: {}\r\n\r\n", form.content_type).as_bytes());
    body.put_slice(&form.payload);
    body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={boundary}"),
        body.freeze(),
    )
}

pub fn new_boundary() -> String {
    format!("----capture-relay-{}", uuid::Uuid::new_v4().simple())
}

fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
