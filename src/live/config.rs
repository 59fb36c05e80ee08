//! Live model session configuration.

use serde::{Deserialize, Serialize};

/// Default live model.
pub const DEFAULT_MODEL: &str = "gemini-live-2.5-flash-preview";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Default spoken language.
pub const DEFAULT_LANGUAGE: &str = "Nepali";

/// What the model answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModality {
    /// Spoken audio.
    #[default]
    Audio,
    /// Text.
    Text,
}

impl ResponseModality {
    /// Wire name of the modality.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }
}

/// Live model settings, the `live` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Model identifier.
    pub model: String,
    /// Response modality.
    pub modality: ResponseModality,
    /// Prebuilt voice name.
    pub voice: String,
    /// Language the model must speak.
    pub language: String,
    /// WebSocket endpoint of the live service.
    pub endpoint: String,
    /// API key for the live service.
    pub api_key: Option<String>,
    /// Seconds to wait for the setup acknowledgement.
    pub setup_timeout_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            modality: ResponseModality::Audio,
            voice: DEFAULT_VOICE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            endpoint: crate::live::gemini::GEMINI_LIVE_URL.to_string(),
            api_key: None,
            setup_timeout_secs: 10,
        }
    }
}

/// The three chart blobs handed to the model as context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartContext {
    /// Birth chart (D1) JSON.
    pub d1: Option<String>,
    /// Navamsa chart (D9) JSON.
    pub d9: Option<String>,
    /// Dasha periods JSON.
    pub dasha: Option<String>,
}

/// Immutable configuration of a live session.
///
/// Built once per manager; every session the manager opens uses the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    model: String,
    modality: ResponseModality,
    voice: String,
    language: String,
    system_instruction: String,
}

impl SessionConfig {
    /// Build a config for a chart consultation.
    pub fn for_chart(settings: &LiveSettings, context: &ChartContext) -> Self {
        Self {
            model: settings.model.clone(),
            modality: settings.modality,
            voice: settings.voice.clone(),
            language: settings.language.clone(),
            system_instruction: system_instruction(&settings.language, context),
        }
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Response modality.
    pub fn modality(&self) -> ResponseModality {
        self.modality
    }

    /// Voice name.
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Spoken language.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Full system instruction.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }
}

fn system_instruction(language: &str, context: &ChartContext) -> String {
    let blob = |b: &Option<String>| b.clone().unwrap_or_else(|| "null".to_string());

    format!(
        "ROLE:\n\
         You are a Vedic astrology consultant. Diagnose the user's life from their chart \
         using strict cause-and-effect reasoning.\n\
         \n\
         LANGUAGE:\n\
         Respond entirely in {language}. Use simple, everyday {language} a common person \
         understands. Do not become poetic because of the language.\n\
         \n\
         TURN RULES:\n\
         - Never speak for more than a minute.\n\
         - Give one insight at a time, never the whole analysis.\n\
         - End every answer with a direct question in {language} about the insight you \
         just gave, and wait for the user before moving on.\n\
         \n\
         TONE: blunt, grounded, concise.\n\
         \n\
         FLOW:\n\
         1. Pick ONE placement or conflict.\n\
         2. State its consequence in one or two sentences.\n\
         3. Ask the user to confirm it.\n\
         \n\
         Start by naming their rashi and lagna.\n\
         \n\
         The user's birth chart (D1) is {d1}.\n\
         The user's navamsa chart (D9) is {d9}.\n\
         The user's dasha periods are {dasha}.",
        language = language,
        d1 = blob(&context.d1),
        d9 = blob(&context.d9),
        dasha = blob(&context.dasha),
    )
}
