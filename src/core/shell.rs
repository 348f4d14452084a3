/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a path for shell execution (always quotes).
///
/// Not usable for remote paths in `~` shorthand: the shell does not expand a quoted tilde.
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Quote a remote path while leaving a leading `~/` outside the quotes so the
/// remote shell still expands it.
pub fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~/".to_string(),
        Some(rest) => format!("~/{}", quote_path(rest)),
        None => quote_path(path),
    }
}

/// Home directory of `user` on a conventional Linux host.
pub fn remote_home(user: &str) -> String {
    if user == "root" {
        "/root".to_string()
    } else {
        format!("/home/{}", user)
    }
}

/// Expand a leading `~` for the transfer connection, which does not understand it.
pub fn expand_remote_home(path: &str, user: &str) -> String {
    if path == "~" {
        return remote_home(user);
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("{}/{}", remote_home(user), rest),
        None => path.to_string(),
    }
}
