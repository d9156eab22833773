//! 日志初始化
//!
//! 容器内部只通过 `tracing` 宏输出日志；是否以及如何输出由应用决定。
//! [`LoggingConfig`] 是安装 `tracing-subscriber` 全局订阅者的便捷入口。
//!
//! ```rust,ignore
//! LoggingConfig::from_env().init()?;
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

use crate::error::{ContainerError, ContainerResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑格式（默认）
    Compact,
    /// 默认的完整格式
    Full,
    /// 每行一个 JSON 对象
    Json,
    /// 多行美化格式，适合开发
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别（默认：Info）
    pub level: LogLevel,

    /// 日志格式（默认：Compact）
    pub format: LogFormat,

    /// 是否显示目标（模块路径）
    pub show_target: bool,

    /// 是否显示线程 ID
    pub show_thread_ids: bool,

    /// 是否输出 ANSI 颜色
    pub ansi: bool,

    /// 过滤指令，优先于 `level`，例如 `"sprig_core=debug,sprig_aop=trace"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            ansi: true,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取配置
    ///
    /// - `RUST_LOG`：过滤指令
    /// - `SPRIG_LOG_LEVEL`：日志级别
    /// - `SPRIG_LOG_FORMAT`：compact / full / json / pretty
    ///
    /// 无法解析的值被忽略，保留默认值。
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            config.filter = Some(filter);
        }
        if let Some(level) = lookup("SPRIG_LOG_LEVEL").and_then(|l| l.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = lookup("SPRIG_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            config.format = format;
        }

        config
    }

    /// 实际使用的过滤指令
    pub fn directives(&self) -> String {
        self.filter
            .clone()
            .unwrap_or_else(|| self.level.to_string())
    }

    /// 安装全局订阅者
    ///
    /// 全局订阅者只能设置一次，重复初始化返回 `LoggingInitFailed`。
    pub fn init(self) -> ContainerResult<()> {
        let env_filter = EnvFilter::try_new(self.directives())
            .map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))?;

        let builder = subscriber_fmt()
            .with_env_filter(env_filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_ansi(self.ansi);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };

        result.map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_directives_prefer_filter() {
        let config = LoggingConfig::new().level(LogLevel::Warn);
        assert_eq!(config.directives(), "warn");

        let config = config.filter("sprig_core=trace");
        assert_eq!(config.directives(), "sprig_core=trace");
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("SPRIG_LOG_LEVEL", "debug"),
            ("SPRIG_LOG_FORMAT", "bogus"),
            ("RUST_LOG", ""),
        ]
        .into_iter()
        .collect();

        let config = LoggingConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        let result = LoggingConfig::new().filter("sprig_core=notalevel").init();
        assert!(matches!(result, Err(ContainerError::LoggingInitFailed(_))));
    }
}
