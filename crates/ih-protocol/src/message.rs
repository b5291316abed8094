//! Streaming output of the assistant.

/// An incremental fragment of assistant text, appended to the trailing
/// assistant turn in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEvent {
    pub text: String,
}

impl DeltaEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for DeltaEvent {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_from_str() {
        let delta = DeltaEvent::from("Hel");
        assert_eq!(delta.text, "Hel");
    }
}
