//! 代理合成
//!
//! Rust 没有运行时动态代理，代理由两部分组成：
//!
//! - [`AopProxy<dyn I>`](AopProxy)：接口 `I` 的转发实现，由 [`proxy_interface!`](crate::proxy_interface)
//!   宏为每个方法生成，调用统一进入 [`AopProxy::dispatch`]；
//! - 织入函数（[`Weaver`]）：挂在 Bean 类型的接口绑定上，
//!   [`ProxyFactory`] 用它为目标的每个可代理接口构造代理视图。

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sprig_core::{
    BeanInstance, BeanType, BeanTypeBuilder, InterfaceBinding, SharedObject, View, Weaver,
};

use crate::advice::MethodInterceptor;
use crate::joinpoint::{JoinPoint, Method, MethodInvocation};
use crate::pointcut::MethodMatcher;

/// 被代理的目标 Bean
#[derive(Debug, Clone)]
pub struct TargetSource {
    target: BeanInstance,
}

impl TargetSource {
    pub fn new(target: BeanInstance) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &BeanInstance {
        &self.target
    }

    pub fn bean_type(&self) -> &Arc<BeanType> {
        self.target.bean_type()
    }

    pub fn interfaces(&self) -> &[InterfaceBinding] {
        self.target.bean_type().interfaces()
    }
}

/// 代理描述：拦截器 + 方法匹配器 + 目标
pub struct ProxySpec {
    interceptor: Arc<dyn MethodInterceptor>,
    method_matcher: Arc<dyn MethodMatcher>,
    target_source: TargetSource,
}

impl ProxySpec {
    pub fn new(
        interceptor: Arc<dyn MethodInterceptor>,
        method_matcher: Arc<dyn MethodMatcher>,
        target_source: TargetSource,
    ) -> Self {
        Self {
            interceptor,
            method_matcher,
            target_source,
        }
    }

    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.interceptor
    }

    pub fn method_matcher(&self) -> &Arc<dyn MethodMatcher> {
        &self.method_matcher
    }

    pub fn target_source(&self) -> &TargetSource {
        &self.target_source
    }
}

impl fmt::Debug for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySpec")
            .field("interceptor", &self.interceptor.name())
            .field("target_type", &self.target_source.bean_type().type_name())
            .finish()
    }
}

/// 接口 `I` 的代理
///
/// 持有目标的 `Arc<I>` 视图；方法调用经 [`dispatch`](Self::dispatch) 决定是否进入拦截器。
pub struct AopProxy<I: ?Sized> {
    target: Arc<I>,
    spec: Arc<ProxySpec>,
}

impl<I: ?Sized + Send + Sync + 'static> AopProxy<I> {
    pub fn new(target: Arc<I>, spec: Arc<ProxySpec>) -> Self {
        Self { target, spec }
    }

    pub fn target(&self) -> &Arc<I> {
        &self.target
    }

    pub fn spec(&self) -> &Arc<ProxySpec> {
        &self.spec
    }

    /// 分派一次方法调用
    ///
    /// 方法匹配器匹配时，调用被包装为 [`MethodInvocation`] 交给拦截器；
    /// 否则直接调用目标。
    ///
    /// # Panics
    ///
    /// 拦截器返回的值类型与方法返回类型 `R` 不一致时 panic。
    pub fn dispatch<A, R, F>(&self, method: Method, args: A, call: F) -> R
    where
        A: 'static,
        R: 'static,
        F: FnOnce(&I, A) -> R,
    {
        let target_source = self.spec.target_source();
        let bean_type = target_source.bean_type();
        let target = &*self.target;

        if !self.spec.method_matcher.matches(&method, bean_type) {
            tracing::trace!("{} does not match, calling target directly", method);
            return call(target, args);
        }

        let interceptor = &self.spec.interceptor;
        let invocation = MethodInvocation::new(
            JoinPoint::new(bean_type.short_name(), method),
            &**target_source.target().object(),
            args,
            move |args| Box::new(call(target, args)) as Box<dyn Any>,
        );

        match interceptor.invoke(invocation).downcast::<R>() {
            Ok(result) => *result,
            Err(_) => panic!(
                "interceptor '{}' returned a value of the wrong type for {}, expected {}",
                interceptor.name(),
                method,
                type_name::<R>()
            ),
        }
    }
}

impl<I: ?Sized> fmt::Debug for AopProxy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("interface", &type_name::<I>())
            .field("spec", &self.spec)
            .finish()
    }
}

/// 可被代理的接口
///
/// 通常由 [`proxy_interface!`](crate::proxy_interface) 为 `dyn Trait` 实现。
pub trait Proxied: Send + Sync + 'static {
    fn weave(proxy: AopProxy<Self>) -> Arc<Self>;
}

/// 为接口 `I` 生成织入函数
pub fn weaver<I: ?Sized + Proxied>() -> Weaver {
    Arc::new(|spec: &dyn Any| {
        let spec = spec.downcast_ref::<Arc<ProxySpec>>()?;
        let target = spec.target_source().target().view::<I>()?;
        let proxy: Arc<I> = I::weave(AopProxy::new(target, Arc::clone(spec)));
        Some(Arc::new(proxy) as View)
    })
}

/// 为 [`BeanTypeBuilder`] 增加可代理接口声明
pub trait ProxyInterfaceExt<T> {
    /// 与 `implements` 相同，同时为该接口挂上织入函数
    fn implements_proxied<I>(self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Proxied;
}

impl<T: Any + Send + Sync> ProxyInterfaceExt<T> for BeanTypeBuilder<T> {
    fn implements_proxied<I>(self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Proxied,
    {
        self.bind(InterfaceBinding::new(cast).with_weaver(weaver::<I>()))
    }
}

/// 代理 Bean 的共享对象
///
/// 代理不能以目标的具体类型访问；通过接口视图使用它。
pub struct AdvisedProxy {
    spec: Arc<ProxySpec>,
}

impl AdvisedProxy {
    pub fn spec(&self) -> &Arc<ProxySpec> {
        &self.spec
    }

    /// 被代理的原始 Bean
    pub fn target(&self) -> &BeanInstance {
        self.spec.target_source().target()
    }
}

impl fmt::Debug for AdvisedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedProxy")
            .field("spec", &self.spec)
            .finish()
    }
}

/// 代理工厂
#[derive(Debug)]
pub struct ProxyFactory {
    spec: Arc<ProxySpec>,
}

impl ProxyFactory {
    pub fn new(spec: ProxySpec) -> Self {
        Self {
            spec: Arc::new(spec),
        }
    }

    /// 合成代理 Bean
    ///
    /// 代理保留目标的声明类型，所以按类型扫描和类型过滤看到的仍是目标类型。
    /// 没有织入函数的接口直接转发到目标视图（不经过通知）；
    /// 目标没有任何可代理接口时原样返回目标。
    pub fn get_proxy(&self) -> BeanInstance {
        let target = self.spec.target_source().target();
        let bean_type = target.bean_type();
        let spec: &dyn Any = &self.spec;

        let mut views: HashMap<_, View> = HashMap::new();
        let mut woven = 0usize;
        for binding in bean_type.interfaces() {
            let view = match binding.weaver().and_then(|weave| (**weave)(spec)) {
                Some(view) => {
                    woven += 1;
                    view
                }
                None => match target.raw_view(binding.type_id()) {
                    Some(view) => {
                        tracing::warn!(
                            "Interface '{}' of '{}' is not proxyable, calls will bypass advice",
                            binding.name(),
                            bean_type.short_name()
                        );
                        Arc::clone(view)
                    }
                    None => continue,
                },
            };
            views.insert(binding.type_id(), view);
        }

        if woven == 0 {
            tracing::warn!(
                "'{}' has no proxyable interfaces, returning the target unproxied",
                bean_type.type_name()
            );
            return target.clone();
        }

        tracing::debug!(
            "Created proxy for '{}' with {} advised interface(s), interceptor '{}'",
            bean_type.short_name(),
            woven,
            self.spec.interceptor().name()
        );

        let object: SharedObject = Arc::new(AdvisedProxy {
            spec: Arc::clone(&self.spec),
        });
        BeanInstance::with_views(object, Arc::clone(bean_type), views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::FnInterceptor;
    use crate::pointcut::PointcutExpression;
    use parking_lot::Mutex;

    crate::proxy_interface! {
        trait Counter {
            fn add(&self, amount: u32) -> u32;
            fn label(&self) -> String;
        }
    }

    trait Plain: Send + Sync {
        fn plain(&self) -> u32;
    }

    struct SimpleCounter {
        base: u32,
    }

    impl Counter for SimpleCounter {
        fn add(&self, amount: u32) -> u32 {
            self.base + amount
        }

        fn label(&self) -> String {
            format!("counter-{}", self.base)
        }
    }

    impl Plain for SimpleCounter {
        fn plain(&self) -> u32 {
            self.base
        }
    }

    fn target() -> BeanInstance {
        let bean_type = BeanType::of::<SimpleCounter>()
            .implements_proxied::<dyn Counter>(|bean| bean)
            .implements::<dyn Plain>(|bean| bean)
            .build();
        BeanInstance::new(Arc::new(SimpleCounter { base: 10 }), Arc::new(bean_type))
    }

    fn spec(calls: Arc<Mutex<Vec<String>>>, expression: &str) -> ProxySpec {
        let interceptor = FnInterceptor::new("recording", move |invocation: MethodInvocation<'_>| {
            calls.lock().push(invocation.method().to_string());
            invocation.proceed()
        });
        ProxySpec::new(
            Arc::new(interceptor),
            Arc::new(PointcutExpression::parse(expression).unwrap()),
            TargetSource::new(target()),
        )
    }

    #[test]
    fn test_matched_methods_are_intercepted() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let proxy = ProxyFactory::new(spec(calls.clone(), "execution(* Counter.add(..))")).get_proxy();

        let counter = proxy.view::<dyn Counter>().unwrap();
        assert_eq!(counter.add(5), 15);
        assert_eq!(counter.label(), "counter-10");
        assert_eq!(*calls.lock(), vec!["Counter.add".to_string()]);

        // 不可代理的接口直接转发
        assert_eq!(proxy.view::<dyn Plain>().unwrap().plain(), 10);
        assert!(proxy.downcast::<AdvisedProxy>().is_some());
        assert!(proxy.downcast::<SimpleCounter>().is_none());
        assert!(proxy.bean_type().implements::<dyn Counter>());
    }

    #[test]
    fn test_interceptor_can_rewrite_arguments_and_result() {
        let interceptor = FnInterceptor::new("doubling", |invocation: MethodInvocation<'_>| {
            let amount = invocation.arguments::<(u32,)>().map(|(amount,)| *amount);
            let result = invocation.proceed();
            match (result.downcast::<u32>(), amount) {
                (Ok(sum), Some(amount)) => Box::new(*sum + amount) as Box<dyn Any>,
                (Ok(sum), None) => sum as Box<dyn Any>,
                (Err(other), _) => other,
            }
        });
        let spec = ProxySpec::new(
            Arc::new(interceptor),
            Arc::new(PointcutExpression::All),
            TargetSource::new(target()),
        );

        let counter = ProxyFactory::new(spec).get_proxy().view::<dyn Counter>().unwrap();
        assert_eq!(counter.add(1), 12);
        assert_eq!(counter.label(), "counter-10");
    }

    #[test]
    fn test_target_without_proxyable_interfaces_is_returned() {
        let bean_type = BeanType::of::<SimpleCounter>()
            .implements::<dyn Plain>(|bean| bean)
            .build();
        let original = BeanInstance::new(Arc::new(SimpleCounter { base: 1 }), Arc::new(bean_type));
        let spec = ProxySpec::new(
            Arc::new(FnInterceptor::new("noop", |invocation: MethodInvocation<'_>| {
                invocation.proceed()
            })),
            Arc::new(PointcutExpression::All),
            TargetSource::new(original.clone()),
        );

        let proxy = ProxyFactory::new(spec).get_proxy();
        assert!(proxy.ptr_eq(&original));
    }

    #[test]
    #[should_panic(expected = "returned a value of the wrong type")]
    fn test_wrong_return_type_panics() {
        let spec = ProxySpec::new(
            Arc::new(FnInterceptor::new("broken", |_invocation: MethodInvocation<'_>| {
                Box::new("not a number") as Box<dyn Any>
            })),
            Arc::new(PointcutExpression::All),
            TargetSource::new(target()),
        );

        let counter = ProxyFactory::new(spec).get_proxy().view::<dyn Counter>().unwrap();
        counter.add(1);
    }
}
