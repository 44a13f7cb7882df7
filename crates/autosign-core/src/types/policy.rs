//! Plugin policies and their recipes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AutosignError, Result};

/// Recipe encoding version understood by this build.
pub const RECIPE_VERSION: u32 = 1;

/// A user-approved automation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: Uuid,
    pub public_key: String,
    pub plugin_id: String,
    pub plugin_version: String,
    pub policy_version: i32,
    pub signature: String,
    /// Base64 of a versioned JSON [`Recipe`]. Opaque to storage.
    pub recipe: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Decode the policy's recipe.
    pub fn recipe(&self) -> Result<Recipe> {
        Recipe::decode(&self.recipe)
    }
}

/// The automation rule plus its recurrence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Recipe {
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<Value>,
    /// Free-form plugin configuration, e.g. `frequency` and `endDate`.
    #[serde(default)]
    pub configuration: Option<Map<String, Value>>,
}

impl Recipe {
    pub fn new(configuration: Map<String, Value>) -> Self {
        Self {
            version: RECIPE_VERSION,
            rules: Vec::new(),
            configuration: Some(configuration),
        }
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AutosignError::Recipe(format!("base64: {e}")))?;
        let recipe: Recipe = serde_json::from_slice(&bytes)
            .map_err(|e| AutosignError::Recipe(format!("json: {e}")))?;
        if recipe.version != RECIPE_VERSION {
            return Err(AutosignError::Recipe(format!(
                "unsupported recipe version {} (expected {RECIPE_VERSION})",
                recipe.version
            )));
        }
        Ok(recipe)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Look up a configuration field.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.configuration.as_ref()?.get(key)
    }
}
