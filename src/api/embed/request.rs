// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request types for the GetEmbedding and GetEmbeddingBatch calls
//!
//! Requests are immutable inputs. Validation happens before any embedder
//! call so a bad prompt never costs an inference.

use crate::api::ApiError;
use serde::{Deserialize, Serialize};

/// Limits applied while validating requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Maximum characters per prompt
    pub max_prompt_chars: usize,
    /// Maximum prompts per batch
    pub max_batch_size: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_prompt_chars: 8192,
            max_batch_size: 96,
        }
    }
}

/// Request body for GetEmbedding
///
/// ```json
/// { "prompt": "Hello world" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRequest {
    pub prompt: String,
}

/// How a batch reacts to a failing prompt
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BatchPolicy {
    /// The first invalid or failing prompt aborts the whole batch
    #[default]
    FailFast,
    /// Failing prompts get an error marker, the rest still get vectors
    PartialSuccess,
}

/// Request body for GetEmbeddingBatch
///
/// ```json
/// { "prompts": ["cat", "dog"], "policy": "partialSuccess" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingBatchRequest {
    /// Order is preserved in the response
    pub prompts: Vec<String>,

    #[serde(default)]
    pub policy: BatchPolicy,
}

impl EmbeddingRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    /// Validates the prompt
    ///
    /// # Validation Rules
    /// 1. Prompt cannot be empty or whitespace-only
    /// 2. Prompt cannot exceed `max_prompt_chars` characters
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), ApiError> {
        validate_prompt("prompt", &self.prompt, limits)
    }

    /// Prompt length in characters, the unit `max_prompt_chars` is measured in
    pub fn char_count(&self) -> usize {
        char_count(&self.prompt)
    }
}

impl EmbeddingBatchRequest {
    pub fn new<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompts: prompts.into_iter().map(Into::into).collect(),
            policy: BatchPolicy::FailFast,
        }
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates the batch size only; an empty batch is valid
    pub fn validate_size(&self, limits: &RequestLimits) -> Result<(), ApiError> {
        if self.prompts.len() > limits.max_batch_size {
            return Err(ApiError::ValidationError {
                field: "prompts".to_string(),
                message: format!(
                    "prompts array cannot contain more than {} items (got {})",
                    limits.max_batch_size,
                    self.prompts.len()
                ),
            });
        }
        Ok(())
    }

    /// Validates every prompt, returning the error for each failing index
    pub fn prompt_errors(&self, limits: &RequestLimits) -> Vec<(usize, ApiError)> {
        self.prompts
            .iter()
            .enumerate()
            .filter_map(|(index, prompt)| {
                validate_prompt(&format!("prompts[{}]", index), prompt, limits)
                    .err()
                    .map(|e| (index, e))
            })
            .collect()
    }

    /// Validates size and all prompts, stopping at the first problem
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), ApiError> {
        self.validate_size(limits)?;
        for (index, prompt) in self.prompts.iter().enumerate() {
            validate_prompt(&format!("prompts[{}]", index), prompt, limits)?;
        }
        Ok(())
    }
}

fn char_count(prompt: &str) -> usize {
    prompt.chars().count()
}

fn validate_prompt(field: &str, prompt: &str, limits: &RequestLimits) -> Result<(), ApiError> {
    if prompt.trim().is_empty() {
        return Err(ApiError::ValidationError {
            field: field.to_string(),
            message: "prompt cannot be empty or contain only whitespace".to_string(),
        });
    }

    let chars = char_count(prompt);
    if chars > limits.max_prompt_chars {
        return Err(ApiError::ValidationError {
            field: field.to_string(),
            message: format!(
                "prompt cannot exceed {} characters (got {} characters)",
                limits.max_prompt_chars, chars
            ),
        });
    }

    Ok(())
}
