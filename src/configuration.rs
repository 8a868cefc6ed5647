use serde;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app_port: u16,
    pub app_host: String,
    pub auth: AuthSettings,
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the token issuer.
    pub access_secret: String,
}

/// Upstream LLM API. Model and limits are fixed per deployment.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RelaySettings {
    /// Turns of history sent along with a new message.
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
    /// Words of the first message used as the conversation name.
    #[serde(default = "default_name_words")]
    pub name_words: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            deadline_secs: default_deadline_secs(),
            persist_retries: default_persist_retries(),
            name_words: default_name_words(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_model() -> String {
    "gpt-3.5-turbo-instruct".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_history_limit() -> i64 {
    5
}

fn default_deadline_secs() -> u64 {
    60
}

fn default_persist_retries() -> u32 {
    3
}

fn default_name_words() -> usize {
    5
}

impl DatabaseSettings {
    // Connection string: postgresql://<username>:<password>@<host>:<port>/<database_name>
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name,
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port,
        )
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration"))
        .build()?;

    let mut config: Settings = settings.try_deserialize()?;

    // Secrets may come from the environment instead of the file
    if let Ok(secret) = std::env::var("ACCESS_SECRET") {
        config.auth.access_secret = secret;
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.openai.api_key = key;
    }

    Ok(config)
}
