//! S1AP task configuration
//!
//! Read from the `s1ap:` section of the YAML configuration file:
//!
//! ```yaml
//! s1ap:
//!   mme_name: nextgcore-mme
//!   relative_capacity: 10
//!   max_ues: 4096
//!   max_enbs: 128
//!   use_stateless: false
//!   ue_context_release_timer_secs: 4
//!   served_tais:
//!     - plmn_id: { mcc: 001, mnc: 01 }
//!       tac: 1
//!   served_gummeis:
//!     - plmn_id: { mcc: 001, mnc: 01 }
//!       mme_gid: 1
//!       mme_code: 1
//! ```

use std::path::Path;

use ogs_s1ap::{Gummei, PlmnId, ServedGummeiItem, Tai};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid PLMN in {section}: {reason}")]
    InvalidPlmn { section: &'static str, reason: String },
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// S1AP task configuration
#[derive(Debug, Clone, PartialEq)]
pub struct S1apConfig {
    pub mme_name: Option<String>,
    pub relative_capacity: u8,
    /// UE table size hint
    pub max_ues: usize,
    /// eNB table size hint
    pub max_enbs: usize,
    /// Checkpoint state to the key/value store
    pub use_stateless: bool,
    pub ue_context_release_timer_secs: u32,
    pub served_tais: Vec<Tai>,
    pub served_gummeis: Vec<Gummei>,
}

impl Default for S1apConfig {
    fn default() -> Self {
        let plmn = PlmnId::new(1, 1, 2);
        Self {
            mme_name: Some("nextgcore-mme".to_string()),
            relative_capacity: 10,
            max_ues: 4096,
            max_enbs: 128,
            use_stateless: false,
            ue_context_release_timer_secs: 4,
            served_tais: vec![Tai { plmn, tac: 1 }],
            served_gummeis: vec![Gummei { plmn, mme_gid: 1, mme_code: 1 }],
        }
    }
}

impl S1apConfig {
    /// Load from a file. A missing or unreadable file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml_str(&content),
            Err(e) => {
                log::warn!("Could not read config file '{}': {}. Using defaults.", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    /// Parse a whole configuration document
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let yaml: Value = serde_yaml::from_str(content)?;
        let mut config = Self::default();

        let section: S1apSection = match yaml.get("s1ap") {
            Some(section) => serde_yaml::from_value(section.clone())?,
            None => {
                log::warn!("No 's1ap' section in config file");
                return Ok(config);
            }
        };

        if let Some(name) = section.mme_name {
            config.mme_name = Some(name);
        }
        if let Some(capacity) = section.relative_capacity {
            config.relative_capacity = capacity;
        }
        if let Some(max_ues) = section.max_ues {
            config.max_ues = max_ues;
        }
        if let Some(max_enbs) = section.max_enbs {
            config.max_enbs = max_enbs;
        }
        if let Some(stateless) = section.use_stateless {
            config.use_stateless = stateless;
        }
        if let Some(secs) = section.ue_context_release_timer_secs {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "ue_context_release_timer_secs",
                    reason: "must be positive".to_string(),
                });
            }
            config.ue_context_release_timer_secs = secs;
        }
        if let Some(tais) = section.served_tais {
            config.served_tais = tais
                .iter()
                .map(|tai| {
                    Ok(Tai {
                        plmn: tai.plmn_id.to_plmn_id("served_tais")?,
                        tac: tai.tac,
                    })
                })
                .collect::<ConfigResult<_>>()?;
        }
        if let Some(gummeis) = section.served_gummeis {
            config.served_gummeis = gummeis
                .iter()
                .map(|g| {
                    Ok(Gummei {
                        plmn: g.plmn_id.to_plmn_id("served_gummeis")?,
                        mme_gid: g.mme_gid,
                        mme_code: g.mme_code,
                    })
                })
                .collect::<ConfigResult<_>>()?;
        }

        log::info!(
            "S1AP config: {} served TAI(s), {} GUMMEI(s), stateless {}",
            config.served_tais.len(),
            config.served_gummeis.len(),
            config.use_stateless
        );
        Ok(config)
    }

    pub fn ue_context_release_timer_msec(&self) -> u32 {
        self.ue_context_release_timer_secs.saturating_mul(1000)
    }

    /// Served GUMMEIs as carried in S1 Setup Response, one item each
    pub fn served_gummei_items(&self) -> Vec<ServedGummeiItem> {
        self.served_gummeis
            .iter()
            .map(|g| ServedGummeiItem {
                served_plmns: vec![g.plmn],
                served_group_ids: vec![g.mme_gid],
                served_mme_codes: vec![g.mme_code],
            })
            .collect()
    }
}

// ============================================================================
// Raw YAML section
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct S1apSection {
    mme_name: Option<String>,
    relative_capacity: Option<u8>,
    max_ues: Option<usize>,
    max_enbs: Option<usize>,
    use_stateless: Option<bool>,
    ue_context_release_timer_secs: Option<u32>,
    served_tais: Option<Vec<TaiConf>>,
    served_gummeis: Option<Vec<GummeiConf>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaiConf {
    plmn_id: PlmnConf,
    #[serde(default)]
    tac: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GummeiConf {
    plmn_id: PlmnConf,
    #[serde(default)]
    mme_gid: u16,
    #[serde(default)]
    mme_code: u8,
}

/// MCC/MNC given either as a number or a string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Digits {
    Number(u64),
    Text(String),
}

impl Digits {
    fn text(&self) -> String {
        match self {
            Digits::Number(n) => n.to_string(),
            Digits::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlmnConf {
    mcc: Digits,
    mnc: Digits,
}

impl PlmnConf {
    fn to_plmn_id(&self, section: &'static str) -> ConfigResult<PlmnId> {
        let invalid = |reason: &str| ConfigError::InvalidPlmn {
            section,
            reason: reason.to_string(),
        };
        let (mcc, mnc) = (self.mcc.text(), self.mnc.text());
        let mcc_value: u16 = mcc.parse().map_err(|_| invalid("mcc is not numeric"))?;
        let mnc_value: u16 = mnc.parse().map_err(|_| invalid("mnc is not numeric"))?;
        if mcc_value > 999 || mnc_value > 999 {
            return Err(invalid("mcc/mnc out of range"));
        }
        // "001" keeps three MNC digits, 1 or "01" gives two
        let mnc_len = if mnc.len() == 3 { 3 } else { 2 };
        if mnc_len == 2 && mnc_value > 99 {
            return Err(invalid("mnc out of range"));
        }
        Ok(PlmnId::new(mcc_value, mnc_value, mnc_len))
    }
}
