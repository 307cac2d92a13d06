//! 日志管理模块
//!
//! 初始化 tracing 订阅器，并在记录上游错误前脱敏敏感字段

use crate::config::LoggingConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use tracing::Level;

/// 脱敏规则
static REDACTION_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let patterns = [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        // API key 各种格式
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._\s-]+"#,
            "authorization: ***",
        ),
        // OpenAI 风格密钥
        (r"sk-[A-Za-z0-9_-]{8,}", "sk-***"),
    ];

    patterns
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
});

/// 初始化全局日志订阅器
///
/// 重复调用时保留第一次安装的订阅器
pub fn init_logging(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    let result = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.with_target)
        .try_init();

    if result.is_err() {
        tracing::debug!("[Logger] 日志订阅器已存在，跳过初始化");
    }
}

/// 脱敏日志消息中的密钥和令牌
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in REDACTION_RULES.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}
