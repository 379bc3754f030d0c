//! 统一配置中心
//!
//! 提供预约服务的全局配置，包括：
//! - HTTP 服务监听
//! - 预约策略（会话时长、支付窗口、取消窗口）
//! - 价格与结算费率
//! - 外部协作方超时
//! - 通知重试
//! - 顾问初始档案
//!
//! 加载顺序：默认值 -> 可选配置文件（APP_CONFIG_FILE） -> 环境变量（APP_*，`__` 分隔层级）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub booking: BookingPolicy,
    #[validate(nested)]
    pub payments: PaymentSettings,
    #[validate(nested)]
    pub collaborators: CollaboratorSettings,
    #[validate(nested)]
    pub notifications: NotificationSettings,
    /// 启动时载入目录的顾问档案
    #[serde(default)]
    #[validate(nested)]
    pub counsellors: Vec<CounsellorSeed>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 预约策略
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BookingPolicy {
    /// 单次会话时长（分钟）
    #[validate(range(min = 5, max = 480))]
    pub session_minutes: u32,
    /// 候选时段间隔（分钟），从 UTC 零点对齐
    #[validate(range(min = 5, max = 1440))]
    pub slot_interval_minutes: u32,
    /// 待支付预约的保留时长
    #[validate(range(min = 1, max = 1440))]
    pub payment_window_minutes: u32,
    /// 已确认预约在开始前多久不可再取消
    #[validate(range(max = 10080))]
    pub cancellation_window_minutes: u32,
    /// 一次可查询的最长时间窗口
    #[validate(range(min = 1, max = 90))]
    pub max_window_days: u32,
    /// 每位学生同时待支付的预约上限，不设置则不限制
    #[serde(default)]
    pub max_pending_per_student: Option<u32>,
    /// 后台清理任务的执行间隔
    #[validate(range(min = 1))]
    pub sweep_interval_seconds: u64,
}

/// 价格与结算
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentSettings {
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
    /// 单次会话价格（最小货币单位）
    #[validate(range(min = 1))]
    pub session_price_minor: i64,
    /// 单场给顾问的结算费率（最小货币单位）
    #[validate(range(min = 0))]
    pub payout_rate_minor: i64,
}

/// 外部协作方（日历、支付、会议、消息）
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CollaboratorSettings {
    #[validate(range(min = 1, max = 60000))]
    pub timeout_ms: u64,
    #[validate(url)]
    pub meeting_base_url: String,
}

/// 通知发送
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotificationSettings {
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    #[validate(range(min = 1))]
    pub backoff_base_ms: u64,
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
    /// 保留的死信条数上限，超出后丢弃最旧的记录
    #[serde(default = "default_dead_letter_capacity")]
    #[validate(range(min = 1))]
    pub dead_letter_capacity: usize,
}

fn default_dead_letter_capacity() -> usize {
    500
}

/// 顾问初始档案
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CounsellorSeed {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1))]
    pub display_name: String,
    #[validate(length(min = 1))]
    pub institution: String,
    #[validate(length(min = 1))]
    pub program: String,
    #[serde(default)]
    pub specialty_tags: Vec<String>,
    #[validate(length(min = 1))]
    pub external_scheduling_ref: String,
    #[serde(default)]
    pub graduation_year: Option<u16>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

fn validate_currency(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("currency"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                cors_origins: vec!["*".into()],
            },
            booking: BookingPolicy {
                session_minutes: 45,
                slot_interval_minutes: 60,
                payment_window_minutes: 15,
                cancellation_window_minutes: 120,
                max_window_days: 14,
                max_pending_per_student: None,
                sweep_interval_seconds: 30,
            },
            payments: PaymentSettings {
                currency: "USD".into(),
                session_price_minor: 2900,
                payout_rate_minor: 2000,
            },
            collaborators: CollaboratorSettings {
                timeout_ms: 5000,
                meeting_base_url: "https://meet.example.com/peer".into(),
            },
            notifications: NotificationSettings {
                max_attempts: 3,
                backoff_base_ms: 200,
                queue_capacity: 256,
                dead_letter_capacity: default_dead_letter_capacity(),
            },
            counsellors: Vec::new(),
        }
    }
}

impl CollaboratorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl NotificationSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl BookingPolicy {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &str) -> Self {
        if path.ends_with(".yml") || path.ends_with(".yaml") {
            ConfigFormat::Yaml
        } else if path.ends_with(".json") {
            ConfigFormat::Json
        } else {
            ConfigFormat::Toml
        }
    }
}

impl AppConfig {
    /// 按 默认值 -> APP_CONFIG_FILE -> APP_* 环境变量 的优先级加载
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            fig = match ConfigFormat::from_path(&path) {
                ConfigFormat::Yaml => fig.merge(Yaml::file(path)),
                ConfigFormat::Json => fig.merge(Json::file(path)),
                ConfigFormat::Toml => fig.merge(Toml::file(path)),
            };
        }
        fig = fig.merge(Env::prefixed("APP_").split("__"));
        Self::from_figment(fig)
    }

    /// 在默认值之上合并一段配置文本
    pub fn from_str(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        let fig = match format {
            ConfigFormat::Toml => fig.merge(Toml::string(text)),
            ConfigFormat::Yaml => fig.merge(Yaml::string(text)),
            ConfigFormat::Json => fig.merge(Json::string(text)),
        };
        Self::from_figment(fig)
    }

    fn from_figment(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = fig
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
