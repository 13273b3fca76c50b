use users::{Users, UsersCache};

pub fn resolve_username(uid: u32, users_cache: &UsersCache) -> String {
    users_cache
        .get_user_by_uid(uid)
        .map(|user| user.name().to_string_lossy().to_string())
        .unwrap_or_else(|| uid.to_string())
}

/// Joins the command line tokens with single spaces, the form the target is matched against.
pub fn join_command_line(command_line: &[String]) -> String {
    command_line.join(" ")
}

/// First one or two tokens of the command line, e.g. `python script.py` or `stress --cpu`.
pub fn short_command_line(command_line: &[String]) -> String {
    command_line
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substring match against the joined command line. An empty command line never matches.
pub fn command_line_matches(command_line: &[String], target: &str) -> bool {
    !command_line.is_empty() && join_command_line(command_line).contains(target)
}
