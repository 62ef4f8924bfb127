use std::fmt;
use std::str::FromStr;

/// Language codes advertised by the models endpoint.
pub const SUPPORTED_LANGUAGES: [&str; 20] = [
    "es", "en", "fr", "de", "it", "pt", "nl", "pl", "ru", "ja", "ko", "zh", "ar", "tr", "vi", "th",
    "sv", "da", "no", "fi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    #[default]
    Transcribe,
    /// Speech to English text.
    Translate,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Transcribe => "transcribe",
            TaskKind::Translate => "translate",
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transcribe" => Ok(TaskKind::Transcribe),
            "translate" => Ok(TaskKind::Translate),
            other => Err(format!(
                "Invalid task: {}. Expected: transcribe or translate",
                other
            )),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptionOptions {
    pub language: Option<String>,
    pub task: TaskKind,
}

impl TranscriptionOptions {
    /// Builds options from raw request values. An empty or `auto` language means
    /// "detect", anything else must look like an ISO 639 code.
    pub fn parse(language: Option<&str>, task: Option<&str>) -> Result<Self, String> {
        let language = match language.map(|l| l.trim().to_lowercase()) {
            None => None,
            Some(l) if l.is_empty() || l == "auto" => None,
            Some(l) => {
                let valid = (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_lowercase());
                if !valid {
                    return Err(format!("Invalid language code: {}", l));
                }
                Some(l)
            }
        };

        let task = match task {
            Some(t) if !t.trim().is_empty() => t.parse()?,
            _ => TaskKind::default(),
        };

        Ok(Self { language, task })
    }
}
