use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page-level signals forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSignal {
    /// The page is about to close; async round trips cannot be awaited
    BeforeUnload,
    /// The tab was backgrounded
    VisibilityHidden,
    /// The tab is visible again
    VisibilityVisible,
    /// Final unload; fires after `BeforeUnload` when the browser gets that far
    Unload,
}

impl PageSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeUnload => "before_unload",
            Self::VisibilityHidden => "visibility_hidden",
            Self::VisibilityVisible => "visibility_visible",
            Self::Unload => "unload",
        }
    }
}

impl fmt::Display for PageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_unload" | "beforeunload" => Ok(Self::BeforeUnload),
            "visibility_hidden" | "hidden" => Ok(Self::VisibilityHidden),
            "visibility_visible" | "visible" => Ok(Self::VisibilityVisible),
            "unload" => Ok(Self::Unload),
            other => Err(format!("unknown page signal: {other}")),
        }
    }
}

/// What to do when the page is backgrounded during a recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// Log only; backgrounding a tab does not truncate the recording
    #[default]
    Ignore,
    /// Stop the recording and deliver what was captured
    FlushAndStop,
}
