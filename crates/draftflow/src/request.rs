use crate::errors::SessionError;

/// Whether the producer writes a new document or reworks an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Generate,
    Refine,
}

/// Immutable input to a generation session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    mode: GenerationMode,
    subject_name: String,
    subject_description: String,
    base_content: Option<String>,
    instructions: Option<String>,
}

impl GenerationRequest {
    /// Request for a brand-new document.
    pub fn generate(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            mode: GenerationMode::Generate,
            subject_name: name.into(),
            subject_description: description.into(),
            base_content: None,
            instructions: None,
        }
    }

    /// Request to rework `base_content` according to `instructions`.
    pub fn refine(
        name: impl Into<String>,
        description: impl Into<String>,
        base_content: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let request = Self {
            mode: GenerationMode::Refine,
            subject_name: name.into(),
            subject_description: description.into(),
            base_content: Some(base_content.into()),
            instructions: Some(instructions.into()),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn subject_description(&self) -> &str {
        &self.subject_description
    }

    pub fn base_content(&self) -> Option<&str> {
        self.base_content.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Checks the mode-specific required fields.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.mode == GenerationMode::Refine {
            if self.base_content.is_none() {
                return Err(SessionError::Validation(
                    "refine requests require base content".into(),
                ));
            }
            if self
                .instructions
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
            {
                return Err(SessionError::Validation(
                    "refine requests require non-empty instructions".into(),
                ));
            }
        }
        Ok(())
    }

    /// Body sent to the producer. Empty optional fields are omitted.
    pub fn to_wire(&self) -> WireRequest<'_> {
        WireRequest {
            name: non_empty(&self.subject_name),
            description: non_empty(&self.subject_description),
            mode: self.mode,
            existing_content: self.base_content.as_deref(),
            instructions: self.instructions.as_deref(),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.trim().is_empty())
}

/// Serialized form of a [`GenerationRequest`].
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    mode: GenerationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}
