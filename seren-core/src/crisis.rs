//! Crisis helpline lookup, keyed by a coarse location tag.

pub const LIFELINE: &str = "988 Suicide & Crisis Lifeline (US/Canada) - Call or Text 988";
pub const CRISIS_TEXT_LINE: &str = "Crisis Text Line (US/Canada) - Text HOME to 741741";
pub const LOCAL_RESOURCE: &str =
    "Please search for your local emergency number or mental health hotline immediately.";

/// Returns a formatted helpline string for the given location tag.
/// "global" resolves to the US/Canada lifeline and text line; anything
/// else falls back to the local-resources instruction.
pub fn helpline(location: &str) -> String {
    if location == "global" {
        format!("Immediate help: {} or Text {}.", LIFELINE, CRISIS_TEXT_LINE)
    } else {
        LOCAL_RESOURCE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_helpline_names_both_hotlines() {
        let line = helpline("global");
        assert!(line.contains("988"));
        assert!(line.contains("741741"));
    }

    #[test]
    fn test_unknown_location_falls_back_to_local_resource() {
        assert_eq!(helpline("de"), LOCAL_RESOURCE);
        assert_eq!(helpline(""), LOCAL_RESOURCE);
    }
}
