//! 统一的错误处理类型
//!
//! 容器内部使用 `ContainerError` 表达所有失败；用户的工厂函数可以返回任意
//! `anyhow::Error`，通过 `?` 自动转换为 `ContainerError::Other`。
//!
//! # 示例
//!
//! ```rust,ignore
//! use sprig_core::prelude::*;
//!
//! fn lookup(factory: &DefaultListableBeanFactory) -> ContainerResult<BeanInstance> {
//!     factory.get_bean("userService")
//! }
//! ```

use thiserror::Error;

pub use anyhow::Result;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 请求的 Bean 没有注册定义
    #[error("No bean named '{0}' is defined")]
    BeanNotFound(String),

    /// 工厂函数构造 Bean 失败
    #[error("Failed to construct bean '{name}': {source}")]
    BeanCreationFailed {
        name: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// Bean 在自己的创建过程中被再次请求（循环引用）
    #[error("Bean '{name}' is currently in creation ({phase}); circular references are not supported")]
    CurrentlyInCreation { name: String, phase: &'static str },

    /// 属性注入失败
    #[error("Failed to inject property '{property}' of bean '{bean}': {source}")]
    PropertyInjectionFailed {
        bean: String,
        property: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// 目标类型没有可写的属性
    #[error("Type '{type_name}' has no writable property '{property}'")]
    NoSuchProperty { type_name: String, property: String },

    /// 类型不匹配
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// BeanPostProcessor 钩子失败
    #[error("Post-processor '{processor}' failed on bean '{bean}': {source}")]
    PostProcessorFailed {
        processor: String,
        bean: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// Bean 定义加载失败
    #[error("Failed to load bean definitions from '{location}': {reason}")]
    DefinitionLoadFailed { location: String, reason: String },

    /// 资源无法读取
    #[error("Resource '{location}' is unavailable: {source}")]
    ResourceUnavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// 切点表达式非法
    #[error("Invalid pointcut expression '{expression}': {reason}")]
    InvalidPointcut { expression: String, reason: String },

    /// 日志初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 上下文已关闭
    #[error("Application context is closed")]
    ContextClosed,

    /// 上下文只能刷新一次
    #[error("Application context has already been refreshed")]
    AlreadyRefreshed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContainerError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn no_such_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::NoSuchProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// 沿着包装链找到最初的错误
    ///
    /// 嵌套的 `get_bean` 调用会层层包装错误（属性注入 -> 后置处理器 -> ...），
    /// 测试和日志通常只关心最内层的原因。
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            Self::BeanCreationFailed { source, .. }
            | Self::PropertyInjectionFailed { source, .. }
            | Self::PostProcessorFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;
