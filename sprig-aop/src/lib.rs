//! Sprig AOP - 基于 Advisor 的自动代理
//!
//! 提供：
//! - 环绕型方法拦截器（[`MethodInterceptor`]）
//! - AspectJ 风格的切点表达式（`execution(...)`、`within(...)`、`&&`、`||`、`!`）
//! - [`ExpressionPointcutAdvisor`]：切点 + 通知
//! - [`AdvisorAutoProxyCreator`]：在 BeanPostProcessor 阶段为匹配的 Bean 合成代理
//!
//! 可代理的接口用 [`proxy_interface!`] 声明。

pub mod advice;
pub mod advisor;
pub mod bean_post_processor;
pub mod error;
pub mod joinpoint;
pub mod pointcut;
pub mod proxy;

// 重新导出核心类型
pub use advice::{FnInterceptor, LoggingInterceptor, MethodInterceptor};
pub use advisor::{Advisor, ExpressionPointcutAdvisor};
pub use bean_post_processor::AdvisorAutoProxyCreator;
pub use error::AopError;
pub use joinpoint::{JoinPoint, Method, MethodInvocation};
pub use pointcut::{
    ClassFilter, ExpressionPointcut, MethodMatcher, NamePattern, Pointcut, PointcutExpression,
};
pub use proxy::{
    weaver, AdvisedProxy, AopProxy, Proxied, ProxyFactory, ProxyInterfaceExt, ProxySpec,
    TargetSource,
};

use sprig_core::TypeRegistry;

/// 把 AOP 基础设施类型注册到类型注册表，供定义文件按名称引用
///
/// 注册的类型名：`AdvisorAutoProxyCreator`、`ExpressionPointcutAdvisor`、`LoggingInterceptor`。
pub fn register_types(types: &mut TypeRegistry) -> &mut TypeRegistry {
    types
        .register_default("AdvisorAutoProxyCreator", AdvisorAutoProxyCreator::bean_type())
        .register_default("ExpressionPointcutAdvisor", ExpressionPointcutAdvisor::bean_type())
        .register_default("LoggingInterceptor", LoggingInterceptor::bean_type())
}

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{FnInterceptor, LoggingInterceptor, MethodInterceptor};
    pub use crate::advisor::{Advisor, ExpressionPointcutAdvisor};
    pub use crate::bean_post_processor::AdvisorAutoProxyCreator;
    pub use crate::joinpoint::{JoinPoint, Method, MethodInvocation};
    pub use crate::pointcut::{ExpressionPointcut, Pointcut, PointcutExpression};
    pub use crate::proxy::{AopProxy, Proxied, ProxyFactory, ProxyInterfaceExt};
    pub use crate::proxy_interface;
}

/// 声明一个可被代理的接口
///
/// 展开为：
/// - trait 定义本身（自动加上 `Send + Sync + 'static` 约束）
/// - `AopProxy<dyn Trait>` 对该 trait 的转发实现
/// - `dyn Trait` 的 [`Proxied`] 实现
///
/// 方法只能以 `&self` 为接收者，参数与返回值必须是 `'static` 的拥有型值。
///
/// ```ignore
/// use sprig_aop::prelude::*;
///
/// proxy_interface! {
///     pub trait HelloWorldService {
///         fn say_hello(&self) -> String;
///         fn greet(&self, name: String, times: u32) -> String;
///     }
/// }
///
/// let bean_type = BeanType::of::<HelloWorldServiceImpl>()
///     .implements_proxied::<dyn HelloWorldService>(|bean| bean);
/// ```
#[macro_export]
macro_rules! proxy_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name: Send + Sync + 'static {
            $(
                $(#[$method_meta])*
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)?;
            )*
        }

        impl $name for $crate::AopProxy<dyn $name> {
            $(
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)? {
                    self.dispatch(
                        $crate::Method::new(stringify!($name), stringify!($method)),
                        ($($arg,)*),
                        |target, ($($arg,)*): ($($arg_ty,)*)| target.$method($($arg),*),
                    )
                }
            )*
        }

        impl $crate::Proxied for dyn $name {
            fn weave(proxy: $crate::AopProxy<Self>) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new(proxy)
            }
        }
    };
}
