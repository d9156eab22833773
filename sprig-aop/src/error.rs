//! AOP 错误类型

use sprig_core::ContainerError;
use thiserror::Error;

/// AOP 模块自身的失败
#[derive(Debug, Error)]
pub enum AopError {
    /// Advisor 没有配置通知（`advice` 属性未注入）
    #[error("Advisor '{advisor}' has no advice configured")]
    AdviceNotConfigured { advisor: String },

    /// 自动代理创建器没有收到 BeanFactory 回调，或者工厂已被释放
    #[error("Bean factory is not available to '{processor}'")]
    FactoryUnavailable { processor: String },
}

impl From<AopError> for ContainerError {
    fn from(error: AopError) -> Self {
        ContainerError::Other(anyhow::Error::new(error))
    }
}
