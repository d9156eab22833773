//! 通知（Advice）定义
//!
//! 环绕型方法拦截器：拦截器决定是否、何时调用 [`MethodInvocation::proceed`]，
//! 并返回（可能被替换的）返回值。

use std::any::Any;
use std::fmt;
use std::time::Duration;

use sprig_core::{BeanType, BeanTypeBuilder, ContainerError, ContainerResult, Injectable, ResolvedValue};

use crate::joinpoint::MethodInvocation;

/// 方法拦截器
///
/// 返回值必须与被拦截方法的返回类型一致（装箱为 `Box<dyn Any>`），
/// 否则代理在调用点 panic。直接返回 `invocation.proceed()` 总是安全的。
///
/// ```ignore
/// struct TimingInterceptor;
///
/// impl MethodInterceptor for TimingInterceptor {
///     fn invoke(&self, invocation: MethodInvocation<'_>) -> Box<dyn Any> {
///         let started = Instant::now();
///         let result = invocation.proceed();
///         tracing::info!("took {:?}", started.elapsed());
///         result
///     }
/// }
/// ```
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: MethodInvocation<'_>) -> Box<dyn Any>;

    /// 获取拦截器名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 闭包拦截器
pub struct FnInterceptor<F> {
    name: String,
    f: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(MethodInvocation<'_>) -> Box<dyn Any> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(MethodInvocation<'_>) -> Box<dyn Any> + Send + Sync,
{
    fn invoke(&self, invocation: MethodInvocation<'_>) -> Box<dyn Any> {
        (self.f)(invocation)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnInterceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor")
            .field("name", &self.name)
            .finish()
    }
}

/// 日志拦截器 - 记录方法进入与退出
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    /// 超过该耗时的调用以 warn 级别记录
    slow_threshold: Option<Duration>,
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// 声明类型：暴露 `dyn MethodInterceptor`
    pub fn bean_type() -> BeanTypeBuilder<Self> {
        BeanType::of::<Self>().implements::<dyn MethodInterceptor>(|interceptor| interceptor)
    }
}

impl Injectable for LoggingInterceptor {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "slow_threshold_ms" => {
                let millis = value.into_i64()?;
                let millis = u64::try_from(millis).map_err(|_| {
                    ContainerError::type_mismatch("non-negative milliseconds", millis.to_string())
                })?;
                self.slow_threshold = Some(Duration::from_millis(millis));
            }
            _ => return Err(ContainerError::no_such_property("LoggingInterceptor", name)),
        }
        Ok(())
    }
}

impl MethodInterceptor for LoggingInterceptor {
    fn invoke(&self, invocation: MethodInvocation<'_>) -> Box<dyn Any> {
        let join_point = invocation.join_point().clone();
        tracing::info!("→ Entering: {}", join_point.signature());

        let result = invocation.proceed();

        let elapsed = join_point.timestamp.elapsed();
        match self.slow_threshold {
            Some(threshold) if elapsed > threshold => tracing::warn!(
                "Slow method detected: {} took {:?} (threshold: {:?})",
                join_point.signature(),
                elapsed,
                threshold
            ),
            _ => tracing::info!("← Exiting: {} (took {:?})", join_point.signature(), elapsed),
        }

        result
    }

    fn name(&self) -> &str {
        "LoggingInterceptor"
    }
}
