//! Native dialog invocations: `zenity` on Linux, `osascript` on macOS.
//!
//! Commands are built as argument vectors and never go through a shell, so action
//! code shown in a dialog cannot break out of the text argument.
use crate::platform::Platform;

pub const PERMISSION_TITLE: &str = "Action Permission";
pub const NOTICE_TITLE: &str = "ScreenPilot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl DialogCommand {
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(self.program);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        cmd
    }
}

/// Yes/no question. Exit status 0 means the affirmative button was pressed.
pub fn confirm_dialog(platform: Platform, title: &str, text: &str) -> Option<DialogCommand> {
    match platform {
        Platform::MacOs => Some(DialogCommand {
            program: "osascript",
            args: vec![
                "-e".into(),
                format!(
                    "display dialog \"{}\" with title \"{}\" buttons {{\"Cancel\", \"OK\"}} \
                     default button \"OK\" cancel button \"Cancel\"",
                    applescript_escape(text),
                    applescript_escape(title),
                ),
            ],
        }),
        Platform::Linux => Some(DialogCommand {
            program: "zenity",
            args: vec![
                "--question".into(),
                "--no-markup".into(),
                format!("--title={title}"),
                format!("--text={text}"),
                "--width=400".into(),
                "--height=200".into(),
            ],
        }),
        Platform::Other => None,
    }
}

/// Informational notice with a single OK button.
pub fn info_dialog(platform: Platform, title: &str, text: &str) -> Option<DialogCommand> {
    match platform {
        Platform::MacOs => Some(DialogCommand {
            program: "osascript",
            args: vec![
                "-e".into(),
                format!(
                    "display dialog \"{}\" with title \"{}\" buttons \"OK\" default button \"OK\"",
                    applescript_escape(text),
                    applescript_escape(title),
                ),
            ],
        }),
        Platform::Linux => Some(DialogCommand {
            program: "zenity",
            args: vec![
                "--info".into(),
                "--no-markup".into(),
                format!("--title={title}"),
                format!("--text={text}"),
                "--width=200".into(),
                "--height=100".into(),
            ],
        }),
        Platform::Other => None,
    }
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zenity_question_keeps_text_in_one_argument() {
        let cmd = confirm_dialog(Platform::Linux, PERMISSION_TITLE, "type(\"a; rm -rf ~\")")
            .expect("linux dialog");
        assert_eq!(cmd.program, "zenity");
        assert!(cmd.args.contains(&"--question".to_string()));
        assert!(cmd.args.contains(&"--text=type(\"a; rm -rf ~\")".to_string()));
    }

    #[test]
    fn osascript_escapes_quotes_and_backslashes() {
        let cmd = confirm_dialog(Platform::MacOs, PERMISSION_TITLE, r#"type("C:\tmp")"#)
            .expect("mac dialog");
        assert_eq!(cmd.program, "osascript");
        assert_eq!(cmd.args[0], "-e");
        assert!(cmd.args[1].starts_with(r#"display dialog "type(\"C:\\tmp\")""#));
        assert!(cmd.args[1].contains("cancel button \"Cancel\""));
    }

    #[test]
    fn unsupported_platforms_have_no_dialogs() {
        assert!(confirm_dialog(Platform::Other, "t", "x").is_none());
        assert!(info_dialog(Platform::Other, "t", "x").is_none());
    }
}
