//! 自动代理创建器 - 为匹配 Advisor 的 Bean 包装 AOP 代理
//!
//! 作为普通 Bean 声明即可，上下文在刷新时会把它注册为 BeanPostProcessor：
//!
//! ```toml
//! [[bean]]
//! name = "autoProxyCreator"
//! type = "AdvisorAutoProxyCreator"
//! ```

use std::sync::{Arc, Weak};

use sprig_core::prelude::*;
use sprig_core::BeanTypeBuilder;

use crate::advice::MethodInterceptor;
use crate::advisor::Advisor;
use crate::error::AopError;
use crate::proxy::{ProxyFactory, ProxySpec, TargetSource};

/// Advisor 驱动的自动代理创建器
///
/// ## 工作原理
///
/// 1. Advisor 和 MethodInterceptor 本身不会被代理
/// 2. 按注册顺序取出容器中所有的 Advisor，检查其类型过滤器
/// 3. 第一个匹配的 Advisor 的通知与方法匹配器用于合成代理
/// 4. 没有匹配时原样返回 Bean
#[derive(Default)]
pub struct AdvisorAutoProxyCreator {
    bean_factory: Option<Weak<dyn ListableBeanFactory>>,
}

impl AdvisorAutoProxyCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明类型：暴露 `dyn BeanPostProcessor`
    pub fn bean_type() -> BeanTypeBuilder<Self> {
        BeanType::of::<Self>().implements::<dyn BeanPostProcessor>(|processor| processor)
    }

    /// 以编程方式注册时使用
    pub fn with_bean_factory(mut self, factory: Weak<dyn ListableBeanFactory>) -> Self {
        self.bean_factory = Some(factory);
        self
    }

    fn bean_factory(&self) -> ContainerResult<Arc<dyn ListableBeanFactory>> {
        self.bean_factory
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                AopError::FactoryUnavailable {
                    processor: self.name().to_string(),
                }
                .into()
            })
    }

    /// AOP 基础设施 Bean 不参与代理
    fn is_infrastructure(bean_type: &BeanType) -> bool {
        bean_type.implements::<dyn Advisor>() || bean_type.implements::<dyn MethodInterceptor>()
    }
}

impl Injectable for AdvisorAutoProxyCreator {
    fn set_bean_factory(&mut self, factory: Weak<dyn ListableBeanFactory>) {
        self.bean_factory = Some(factory);
    }
}

impl BeanPostProcessor for AdvisorAutoProxyCreator {
    fn name(&self) -> &str {
        "AdvisorAutoProxyCreator"
    }

    fn post_process_after_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        if Self::is_infrastructure(bean.bean_type()) {
            tracing::trace!("Bean '{}' is AOP infrastructure, skipping", bean_name);
            return Ok(bean);
        }

        let factory = self.bean_factory()?;
        for advisor in factory.get_beans_of_type::<dyn Advisor>()? {
            let pointcut = advisor.pointcut();
            if !pointcut.class_filter().matches(bean.bean_type()) {
                continue;
            }

            tracing::debug!("Bean '{}' matches an advisor, creating proxy", bean_name);
            let spec = ProxySpec::new(
                advisor.advice()?,
                pointcut.method_matcher(),
                TargetSource::new(bean),
            );
            return Ok(ProxyFactory::new(spec).get_proxy());
        }

        tracing::trace!("Bean '{}' does not match any advisor", bean_name);
        Ok(bean)
    }
}
