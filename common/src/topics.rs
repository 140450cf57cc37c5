pub const CLIMATE_SUBTOPIC: &str = "ac";

/// Published to the telemetry topic on every broker (re)connect.
pub const CONNECTED_PAYLOAD: &str = "CONNECTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRoute<'a> {
    Climate,
    Unknown(&'a str),
}

/// Subscription filter covering the command topic and all of its subtopics.
pub fn command_filter(command_topic: &str) -> String {
    format!("{}/#", command_topic.trim_end_matches('/'))
}

/// Classifies an inbound topic. Returns `None` for topics outside the command tree.
pub fn route_command<'a>(command_topic: &str, topic: &'a str) -> Option<CommandRoute<'a>> {
    let base = command_topic.trim_end_matches('/');
    let subtopic = topic.strip_prefix(base)?.strip_prefix('/')?;

    if subtopic == CLIMATE_SUBTOPIC {
        Some(CommandRoute::Climate)
    } else {
        Some(CommandRoute::Unknown(subtopic))
    }
}
