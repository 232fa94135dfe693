//! Configuration for the extraction pipeline

use serde::{Deserialize, Serialize};
use sift_domain::ExtractionMode;
use std::time::Duration;

/// Window sizes for splitting a document into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProfile {
    /// Characters per chunk
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,

    /// Upper bound on the number of chunks
    pub max_chunks: usize,
}

impl ChunkProfile {
    /// Single-chunk profile used for abstracts
    pub fn abstract_default() -> Self {
        Self {
            chunk_size: 10_000,
            overlap: 0,
            max_chunks: 1,
        }
    }

    /// Overlapping profile used for full text
    pub fn fulltext_default() -> Self {
        Self {
            chunk_size: 3_000,
            overlap: 500,
            max_chunks: 10,
        }
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if self.overlap >= self.chunk_size {
            return Err(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            ));
        }
        if self.max_chunks == 0 {
            return Err("max_chunks must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the extraction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Manual retries allowed per document
    pub max_retries: u32,

    /// Maximum time for a single model call (seconds)
    pub invocation_timeout_secs: u64,

    /// Characters of raw text used as context when a document has no sections
    pub fallback_context_chars: usize,

    /// Use the streaming invocation and emit typing events
    #[serde(default)]
    pub stream_deltas: bool,

    /// Chunking for abstract mode
    pub abstract_profile: ChunkProfile,

    /// Chunking for full-text mode
    pub fulltext_profile: ChunkProfile,
}

impl ExtractorConfig {
    /// Get the invocation timeout as a Duration
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    /// Chunk profile for a mode
    pub fn profile(&self, mode: ExtractionMode) -> ChunkProfile {
        match mode {
            ExtractionMode::Abstract => self.abstract_profile,
            ExtractionMode::Fulltext => self.fulltext_profile,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.abstract_profile
            .validate()
            .map_err(|e| format!("abstract_profile: {}", e))?;
        self.fulltext_profile
            .validate()
            .map_err(|e| format!("fulltext_profile: {}", e))?;
        if self.invocation_timeout_secs == 0 {
            return Err("invocation_timeout_secs must be greater than 0".to_string());
        }
        if self.fallback_context_chars == 0 {
            return Err("fallback_context_chars must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            abstract_profile: ChunkProfile::abstract_default(),
            fulltext_profile: ChunkProfile::fulltext_default(),
            max_retries: 3,
            invocation_timeout_secs: 120,
            fallback_context_chars: 4_000,
            stream_deltas: false,
        }
    }
}

impl ExtractorConfig {
    /// Aggressive preset: fewer, smaller chunks and shorter timeouts
    pub fn aggressive() -> Self {
        Self {
            abstract_profile: ChunkProfile::abstract_default(),
            fulltext_profile: ChunkProfile {
                chunk_size: 2_000,
                overlap: 200,
                max_chunks: 5,
            },
            max_retries: 1,
            invocation_timeout_secs: 60,
            fallback_context_chars: 2_000,
            stream_deltas: false,
        }
    }

    /// Lenient preset: larger windows and longer timeouts for better coverage
    pub fn lenient() -> Self {
        Self {
            abstract_profile: ChunkProfile {
                chunk_size: 20_000,
                overlap: 0,
                max_chunks: 1,
            },
            fulltext_profile: ChunkProfile {
                chunk_size: 6_000,
                overlap: 1_000,
                max_chunks: 20,
            },
            max_retries: 5,
            invocation_timeout_secs: 300,
            fallback_context_chars: 8_000,
            stream_deltas: false,
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
