//! Parsing of REPL input lines.

use std::path::PathBuf;

use chatline_core::settings::{Language, Theme, VoiceConfig};

/// Help shown by `/help`.
pub const HELP: &str = "\
Type a message and press Enter to send it.

Commands:
  /image <path> <text>  Send a message with an image attachment
  /new [title]          Start a new session
  /sessions             List sessions
  /switch <n>           Switch to session n
  /rename <title>       Rename the current session
  /delete [n]           Delete session n (default: current)
  /clear                Remove all messages from the current session
  /models               List models
  /model <name>         Select a model
  /usage                Show storage usage
  /stt <file>           Transcribe an audio file and send the text
  /tts [file]           Speak the last reply into an audio file
  /settings             Show settings
  /set <name> <value>   Change a setting: endpoint, theme, language, voice,
                        speed, voice-mode, autoplay, voice-streaming
  /reset-settings       Restore default settings
  /help                 Show this help
  /quit                 Exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send plain text.
    Send(String),
    /// Send text with an image file.
    Image {
        /// Image file.
        path: PathBuf,
        /// Accompanying text.
        text: String,
    },
    /// Create a session.
    New(Option<String>),
    /// List sessions.
    Sessions,
    /// Select a session by 1-based position.
    Switch(usize),
    /// Rename the current session.
    Rename(String),
    /// Delete a session by 1-based position, or the current one.
    Delete(Option<usize>),
    /// Clear the current session.
    Clear,
    /// List models.
    Models,
    /// Select a model.
    Model(String),
    /// Show storage usage.
    Usage,
    /// Transcribe an audio file and send the text.
    Stt(PathBuf),
    /// Speak the last assistant reply, optionally into a given file.
    Tts(Option<PathBuf>),
    /// Show settings.
    Settings,
    /// Change one setting.
    Set(SettingChange),
    /// Restore default settings.
    ResetSettings,
    /// Show help.
    Help,
    /// Exit.
    Quit,
}

/// A single setting change from `/set`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    /// Chat service base URL.
    Endpoint(String),
    /// Color theme.
    Theme(Theme),
    /// Interface language.
    Language(Language),
    /// Voice preset.
    Voice(String),
    /// Playback speed.
    Speed(f32),
    /// Voice features on or off.
    VoiceEnabled(bool),
    /// Speak replies automatically.
    AutoPlay(bool),
    /// Use the streaming synthesis route.
    VoiceStreaming(bool),
}

impl SettingChange {
    const USAGE: &'static str = "/set endpoint <url> | theme light|dark | language zh|en | \
voice <name> | speed <0.5-2.0> | voice-mode on|off | autoplay on|off | voice-streaming on|off";

    fn parse(args: &str) -> Result<Self, CommandError> {
        let (name, value) = args
            .split_once(char::is_whitespace)
            .map(|(name, value)| (name, value.trim()))
            .ok_or(CommandError::Usage(Self::USAGE))?;
        let usage = || CommandError::Usage(Self::USAGE);

        match name {
            "endpoint" if value.starts_with("http://") || value.starts_with("https://") => {
                Ok(Self::Endpoint(value.trim_end_matches('/').to_string()))
            }
            "theme" => match value {
                "light" => Ok(Self::Theme(Theme::Light)),
                "dark" => Ok(Self::Theme(Theme::Dark)),
                _ => Err(usage()),
            },
            "language" => match value {
                "zh" => Ok(Self::Language(Language::Zh)),
                "en" => Ok(Self::Language(Language::En)),
                _ => Err(usage()),
            },
            "voice" if VoiceConfig::VOICES.contains(&value) => Ok(Self::Voice(value.to_string())),
            "speed" => value
                .parse::<f32>()
                .ok()
                .filter(|s| (VoiceConfig::MIN_SPEED..=VoiceConfig::MAX_SPEED).contains(s))
                .map(Self::Speed)
                .ok_or_else(usage),
            "voice-mode" => parse_switch(value).map(Self::VoiceEnabled).ok_or_else(usage),
            "autoplay" => parse_switch(value).map(Self::AutoPlay).ok_or_else(usage),
            "voice-streaming" => parse_switch(value).map(Self::VoiceStreaming).ok_or_else(usage),
            _ => Err(usage()),
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}

/// Errors produced while parsing a line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Nothing to do.
    #[error("empty input")]
    Empty,

    /// The command is not known.
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    /// The command's arguments are wrong.
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one line of input.
    ///
    /// # Errors
    ///
    /// Returns an error for blank lines, unknown commands and bad arguments.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, args)| (name, args.trim()));

        match name {
            "image" => {
                let (path, text) = args
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::Usage("/image <path> <text>"))?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(CommandError::Usage("/image <path> <text>"));
                }
                Ok(Self::Image {
                    path: PathBuf::from(path),
                    text: text.to_string(),
                })
            }
            "new" => Ok(Self::New((!args.is_empty()).then(|| args.to_string()))),
            "sessions" => Ok(Self::Sessions),
            "switch" => parse_index(args)
                .map(Self::Switch)
                .ok_or(CommandError::Usage("/switch <n>")),
            "rename" if !args.is_empty() => Ok(Self::Rename(args.to_string())),
            "rename" => Err(CommandError::Usage("/rename <title>")),
            "delete" if args.is_empty() => Ok(Self::Delete(None)),
            "delete" => parse_index(args)
                .map(|n| Self::Delete(Some(n)))
                .ok_or(CommandError::Usage("/delete [n]")),
            "clear" => Ok(Self::Clear),
            "models" => Ok(Self::Models),
            "model" if !args.is_empty() => Ok(Self::Model(args.to_string())),
            "model" => Err(CommandError::Usage("/model <name>")),
            "usage" => Ok(Self::Usage),
            "stt" if !args.is_empty() => Ok(Self::Stt(PathBuf::from(args))),
            "stt" => Err(CommandError::Usage("/stt <file>")),
            "tts" => Ok(Self::Tts((!args.is_empty()).then(|| PathBuf::from(args)))),
            "settings" => Ok(Self::Settings),
            "set" => SettingChange::parse(args).map(Self::Set),
            "reset-settings" => Ok(Self::ResetSettings),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_index(args: &str) -> Option<usize> {
    args.parse().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            Command::parse("  hello there \n"),
            Ok(Command::Send("hello there".to_string()))
        );
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
    }

    #[test]
    fn image_command() {
        assert_eq!(
            Command::parse("/image cat.png what is this?"),
            Ok(Command::Image {
                path: PathBuf::from("cat.png"),
                text: "what is this?".to_string(),
            })
        );
        assert!(matches!(
            Command::parse("/image cat.png"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn session_commands() {
        assert_eq!(Command::parse("/new"), Ok(Command::New(None)));
        assert_eq!(
            Command::parse("/new Trip plans"),
            Ok(Command::New(Some("Trip plans".to_string())))
        );
        assert_eq!(Command::parse("/switch 2"), Ok(Command::Switch(2)));
        assert!(Command::parse("/switch 0").is_err());
        assert!(Command::parse("/switch two").is_err());
        assert_eq!(Command::parse("/delete"), Ok(Command::Delete(None)));
        assert_eq!(Command::parse("/delete 3"), Ok(Command::Delete(Some(3))));
        assert_eq!(
            Command::parse("/rename  Better title "),
            Ok(Command::Rename("Better title".to_string()))
        );
        assert!(Command::parse("/rename").is_err());
    }

    #[test]
    fn model_commands() {
        assert_eq!(Command::parse("/models"), Ok(Command::Models));
        assert_eq!(
            Command::parse("/model gpt-4o-mini"),
            Ok(Command::Model("gpt-4o-mini".to_string()))
        );
        assert!(Command::parse("/model").is_err());
    }

    #[test]
    fn voice_commands() {
        assert_eq!(
            Command::parse("/stt memo.wav"),
            Ok(Command::Stt(PathBuf::from("memo.wav")))
        );
        assert!(Command::parse("/stt").is_err());
        assert_eq!(Command::parse("/tts"), Ok(Command::Tts(None)));
        assert_eq!(
            Command::parse("/tts out.mp3"),
            Ok(Command::Tts(Some(PathBuf::from("out.mp3"))))
        );
    }

    #[test]
    fn setting_changes() {
        let set = |line: &str| match Command::parse(line) {
            Ok(Command::Set(change)) => Some(change),
            _ => None,
        };
        assert_eq!(
            set("/set endpoint http://chat.local:9200/"),
            Some(SettingChange::Endpoint("http://chat.local:9200".to_string()))
        );
        assert_eq!(set("/set theme dark"), Some(SettingChange::Theme(Theme::Dark)));
        assert_eq!(set("/set language en"), Some(SettingChange::Language(Language::En)));
        assert_eq!(set("/set voice nova"), Some(SettingChange::Voice("nova".to_string())));
        assert_eq!(set("/set speed 1.5"), Some(SettingChange::Speed(1.5)));
        assert_eq!(set("/set autoplay on"), Some(SettingChange::AutoPlay(true)));
        assert_eq!(set("/set voice-mode off"), Some(SettingChange::VoiceEnabled(false)));

        for bad in [
            "/set",
            "/set theme",
            "/set theme blue",
            "/set endpoint ftp://x",
            "/set voice robot",
            "/set speed 3",
            "/set speed fast",
            "/set autoplay maybe",
            "/set colour red",
        ] {
            assert!(
                matches!(Command::parse(bad), Err(CommandError::Usage(_))),
                "{bad}"
            );
        }
        assert_eq!(Command::parse("/settings"), Ok(Command::Settings));
        assert_eq!(Command::parse("/reset-settings"), Ok(Command::ResetSettings));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            Command::parse("/frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
    }
}
