use std::{borrow::Cow, fmt};

/// Outcome of captioning one image. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caption {
    Ok(String),
    Failed(String),
}

impl Caption {
    pub fn from_result<E>(result: Result<String, E>) -> Self
    where
        E: Into<anyhow::Error>,
    {
        match result {
            Ok(text) => Caption::Ok(text),
            Err(e) => Caption::Failed(format!("{:#}", e.into())),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Caption::Ok(_))
    }

    pub fn is_failed(&self) -> bool {
        !self.is_ok()
    }

    /// What gets shown and exported: the caption, or `Error: <reason>`.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Caption::Ok(text) => Cow::Borrowed(text),
            Caption::Failed(reason) => Cow::Owned(format!("Error: {}", reason)),
        }
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
