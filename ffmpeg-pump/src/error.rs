use std::fmt::{Display, Formatter};

/// Which elementary stream a unit, codec session or failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine call that produced an unexpected outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Read,
    Send,
    Receive,
    Header,
    Write,
    Trailer,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Read => "read",
            Phase::Send => "send",
            Phase::Receive => "receive",
            Phase::Header => "header",
            Phase::Write => "write",
            Phase::Trailer => "trailer",
        };
        f.write_str(s)
    }
}

/// Label of a failed pipeline stage: a stream kind (or the container itself) and a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    pub kind: Option<MediaKind>,
    pub phase: Phase,
}

impl Stage {
    pub fn stream(kind: MediaKind, phase: Phase) -> Self {
        Self {
            kind: Some(kind),
            phase,
        }
    }

    pub fn container(phase: Phase) -> Self {
        Self { kind: None, phase }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{} {}", kind, self.phase),
            None => write!(f, "container {}", self.phase),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Precondition misuse: not opened yet, already closed, opened twice, missing stream.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("failed to open {what}: {source}")]
    EngineOpen {
        what: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{kind} unit does not match stream configuration: expected {expected}, got {actual}")]
    FormatMismatch {
        kind: MediaKind,
        expected: String,
        actual: String,
    },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// The conversion context table is at capacity; the key cannot be added.
    #[error("conversion context cache is full ({capacity} entries)")]
    CacheFull { capacity: usize },
}

impl MediaError {
    pub fn engine_open(what: impl Into<String>, source: ffmpeg_next::Error) -> Self {
        MediaError::EngineOpen {
            what: what.into(),
            source,
        }
    }

    pub fn stage(stage: Stage, source: ffmpeg_next::Error) -> Self {
        MediaError::Stage { stage, source }
    }

    /// True for errors raised before touching any engine state.
    pub fn is_precondition(&self) -> bool {
        matches!(self, MediaError::InvalidState(_))
    }
}

pub type Result<T, E = MediaError> = std::result::Result<T, E>;
