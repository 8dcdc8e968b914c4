use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tagwatch_core::stackexchange::{DEFAULT_BASE_URL, DEFAULT_SITE};
use tagwatch_core::{MonitorSettings, StackExchangeConfig};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tags: Vec<String>,
    pub monitor: MonitorSettings,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub site: String,
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            site: DEFAULT_SITE.to_string(),
            key: None,
        }
    }
}

impl ApiConfig {
    pub fn stack_exchange(&self) -> StackExchangeConfig {
        StackExchangeConfig {
            base_url: self.base_url.clone(),
            site: self.site.clone(),
            api_key: self.key.clone(),
        }
    }
}

impl AppConfig {
    /// `tagwatch/config.json` dans le dossier de configuration de l'utilisateur,
    /// dont le répertoire est créé au besoin
    pub fn config_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir =
            dirs::config_dir().ok_or("Impossible de trouver le dossier de configuration")?;

        let app_config_dir = config_dir.join("tagwatch");
        std::fs::create_dir_all(&app_config_dir)?;

        Ok(app_config_dir.join("config.json"))
    }

    /// Lit le fichier et borne les réglages du moniteur; en cas d'échec,
    /// repart des valeurs par défaut et tente de les écrire
    pub fn load() -> Self {
        match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load configuration, using defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save() {
                    warn!(error = %save_err, "failed to save default configuration");
                }
                default_config
            }
        }
    }

    fn load_from_file() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::config_file_path()?;
        let config_content = std::fs::read_to_string(&config_path)?;
        let mut config: AppConfig = serde_json::from_str(&config_content)?;
        config.monitor = config.monitor.normalized();
        info!(path = %config_path.display(), "configuration loaded");
        Ok(config)
    }

    /// Écrit le JSON dans un fichier temporaire puis le renomme par-dessus l'ancien
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::config_file_path()?;
        let config_json = serde_json::to_string_pretty(self)?;
        let tmp = config_path.with_extension("json.tmp");
        std::fs::write(&tmp, config_json)?;
        std::fs::rename(&tmp, &config_path)?;
        Ok(())
    }

    /// Remplace la liste des tags passée en ligne de commande et l'enregistre
    pub fn update_tags(&mut self, tags: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
        self.tags = tags;
        self.save()
    }
}
