//! Shell command text for the shell strategy and the attribute commands.

use std::borrow::Cow;

use crate::config::PRIVILEGE_ESCALATION_COMMAND;

use super::StatField;

/// Escapes one shell word.
pub(super) fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(value.into())
}

/// Prefixes `command` with the escalation command when `elevated`.
pub(super) fn escalate(command: String, elevated: bool) -> String {
    if elevated {
        format!("{PRIVILEGE_ESCALATION_COMMAND} {command}")
    } else {
        command
    }
}

pub(super) fn test_file(path: &str, elevated: bool) -> String {
    escalate(format!("test -f {}", quote(path)), elevated)
}

pub(super) fn test_not_file(path: &str, elevated: bool) -> String {
    escalate(format!("test ! -f {}", quote(path)), elevated)
}

pub(super) fn cat(path: &str, elevated: bool) -> String {
    escalate(format!("cat {}", quote(path)), elevated)
}

/// Writes standard input to `path`; only `tee` runs elevated.
pub(super) fn tee(path: &str, elevated: bool) -> String {
    format!(
        "cat /dev/stdin | {}",
        escalate(format!("tee {}", quote(path)), elevated)
    )
}

pub(super) fn chmod(mode: &str, path: &str, elevated: bool) -> String {
    escalate(format!("chmod {} {}", quote(mode), quote(path)), elevated)
}

pub(super) fn chown(owner: &str, path: &str, elevated: bool) -> String {
    escalate(format!("chown {} {}", quote(owner), quote(path)), elevated)
}

pub(super) fn chgrp(group: &str, path: &str, elevated: bool) -> String {
    escalate(format!("chgrp {} {}", quote(group), quote(path)), elevated)
}

pub(super) fn stat_mode(path: &str, elevated: bool) -> String {
    escalate(format!("stat -c %a {}", quote(path)), elevated)
}

pub(super) fn stat(field: StatField, path: &str, elevated: bool) -> String {
    escalate(
        format!("stat -c %{} {}", field.format(), quote(path)),
        elevated,
    )
}

pub(super) fn remove(path: &str, elevated: bool) -> String {
    escalate(format!("rm {}", quote(path)), elevated)
}
