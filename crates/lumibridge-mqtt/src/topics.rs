//! Topic namespace.
//!
//! Everything the bridge says goes to `<prefix>/from`; everything it obeys
//! arrives under `<prefix>/to/`. The segment after `to/` names the command.

/// The bridge's topic namespace under one configurable prefix.
#[derive(Debug, Clone)]
pub struct TopicLayout {
    from: String,
    to_prefix: String,
}

impl TopicLayout {
    pub fn new(prefix: &str) -> Self {
        Self {
            from: format!("{}/from", prefix),
            to_prefix: format!("{}/to", prefix),
        }
    }

    /// Topic all envelopes are published on.
    pub fn from_topic(&self) -> &str {
        &self.from
    }

    /// Subscription filter covering every command topic.
    pub fn command_filter(&self) -> String {
        format!("{}/#", self.to_prefix)
    }

    /// Command name for an inbound topic, if it is one of ours.
    pub fn command_suffix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.to_prefix.as_str())?
            .strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix_layout() {
        let topics = TopicLayout::new("xiaomi");
        assert_eq!(topics.from_topic(), "xiaomi/from");
        assert_eq!(topics.command_filter(), "xiaomi/to/#");
    }

    #[test]
    fn test_command_suffix_extraction() {
        let topics = TopicLayout::new("xiaomi");
        assert_eq!(topics.command_suffix("xiaomi/to/read"), Some("read"));
        assert_eq!(topics.command_suffix("xiaomi/to/write"), Some("write"));
        assert_eq!(
            topics.command_suffix("xiaomi/to/get_id_list"),
            Some("get_id_list")
        );
    }

    #[test]
    fn test_foreign_topics_are_not_commands() {
        let topics = TopicLayout::new("xiaomi");
        assert_eq!(topics.command_suffix("xiaomi/to"), None);
        assert_eq!(topics.command_suffix("xiaomi/from"), None);
        assert_eq!(topics.command_suffix("other/to/read"), None);
    }

    #[test]
    fn test_custom_prefix() {
        let topics = TopicLayout::new("home/aqara");
        assert_eq!(topics.from_topic(), "home/aqara/from");
        assert_eq!(topics.command_suffix("home/aqara/to/read"), Some("read"));
    }
}
