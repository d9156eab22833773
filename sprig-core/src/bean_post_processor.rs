//! BeanPostProcessor - Bean 工厂扩展机制
//!
//! 在属性注入完成之后、Bean 进入单例缓存之前提供两个钩子。
//! 钩子可以原样返回 Bean，也可以返回一个替代实例（例如 AOP 代理），
//! 替代实例就是缓存并对外提供的那个对象。

use crate::bean::BeanInstance;
use crate::error::ContainerResult;

/// BeanPostProcessor trait
///
/// 所有处理器的 before 钩子按注册顺序执行完毕后，再按注册顺序执行 after 钩子；
/// 每个钩子接收上一个钩子的输出。
///
/// # 示例
///
/// ```ignore
/// use sprig_core::prelude::*;
///
/// #[derive(Default)]
/// pub struct TracingPostProcessor;
///
/// impl Injectable for TracingPostProcessor {}
///
/// impl BeanPostProcessor for TracingPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: BeanInstance,
///         bean_name: &str,
///     ) -> ContainerResult<BeanInstance> {
///         tracing::info!("Bean ready: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在 after 钩子之前调用
    ///
    /// # 返回
    /// 返回处理后的 Bean 实例（可以是原始 Bean，也可以是替代实例）
    fn post_process_before_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        Ok(bean)
    }

    /// 在所有 before 钩子之后调用
    ///
    /// # 典型用途
    /// - 创建 AOP 代理
    /// - 包装 Bean
    fn post_process_after_initialization(
        &self,
        bean: BeanInstance,
        _bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        Ok(bean)
    }

    /// 获取处理器的名称（用于日志和错误信息）
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
