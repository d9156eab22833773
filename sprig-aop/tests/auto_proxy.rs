use std::any::{Any, TypeId};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sprig_aop::prelude::*;
use sprig_aop::AdvisedProxy;
use sprig_core::prelude::*;

// ---------------------------------------------------------------------------
// fixtures
// ---------------------------------------------------------------------------

proxy_interface! {
    /// 被代理的问候接口
    pub trait Greeting {
        fn greet(&self, name: String) -> String;
        fn farewell(&self) -> String;
    }
}

#[derive(Default)]
struct Foo {
    salutation: String,
}

impl Greeting for Foo {
    fn greet(&self, name: String) -> String {
        format!("{}, {}", self.salutation, name)
    }

    fn farewell(&self) -> String {
        "bye".to_string()
    }
}

impl Injectable for Foo {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "salutation" => self.salutation = value.into_string()?,
            _ => return Err(ContainerError::no_such_property("Foo", name)),
        }
        Ok(())
    }
}

fn foo_type() -> sprig_core::BeanTypeBuilder<Foo> {
    BeanType::of::<Foo>().implements_proxied::<dyn Greeting>(|bean| bean)
}

#[derive(Default)]
struct Bar;

impl Greeting for Bar {
    fn greet(&self, name: String) -> String {
        format!("bar greets {}", name)
    }

    fn farewell(&self) -> String {
        "bar leaves".to_string()
    }
}

impl Injectable for Bar {}

/// 引用 Greeting 的普通 Bean
#[derive(Default)]
struct Audience {
    greeting: Option<Arc<dyn Greeting>>,
}

impl Injectable for Audience {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "greeting" => self.greeting = Some(value.into_interface::<dyn Greeting>()?),
            _ => return Err(ContainerError::no_such_property("Audience", name)),
        }
        Ok(())
    }
}

/// 计数并在结果后追加标记的拦截器
#[derive(Default)]
struct CountingInterceptor {
    calls: AtomicUsize,
    marker: String,
}

impl CountingInterceptor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MethodInterceptor for CountingInterceptor {
    fn invoke(&self, invocation: MethodInvocation<'_>) -> Box<dyn Any> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = invocation.proceed();
        match result.downcast::<String>() {
            Ok(text) => Box::new(format!("{}{}", text, self.marker)) as Box<dyn Any>,
            Err(other) => other,
        }
    }
}

impl Injectable for CountingInterceptor {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "marker" => self.marker = value.into_string()?,
            _ => return Err(ContainerError::no_such_property("CountingInterceptor", name)),
        }
        Ok(())
    }
}

fn interceptor_definition(marker: &str) -> BeanDefinition {
    BeanDefinition::with_default(
        BeanType::of::<CountingInterceptor>()
            .implements::<dyn MethodInterceptor>(|interceptor| interceptor),
    )
    .with_property(PropertyValue::literal("marker", marker))
}

fn advisor_definition(expression: &str, advice: &str) -> BeanDefinition {
    BeanDefinition::with_default(ExpressionPointcutAdvisor::bean_type())
        .with_property(PropertyValue::literal("expression", expression))
        .with_property(PropertyValue::reference("advice", advice))
}

/// 注册自动代理创建器并像上下文刷新时那样把它加入后置处理器列表
fn factory_with_auto_proxy() -> Arc<DefaultListableBeanFactory> {
    let factory = DefaultListableBeanFactory::new();
    factory.register_bean_definition(
        "autoProxyCreator".to_string(),
        BeanDefinition::with_default(AdvisorAutoProxyCreator::bean_type()),
    );
    let creator = factory
        .get_bean_as::<dyn BeanPostProcessor>("autoProxyCreator")
        .unwrap();
    factory.add_bean_post_processor(creator);
    factory
}

// ---------------------------------------------------------------------------
// tests
// ---------------------------------------------------------------------------

#[test]
fn matched_method_is_intercepted_once_per_call() {
    let factory = factory_with_auto_proxy();
    factory.register_bean_definition("interceptor".to_string(), interceptor_definition("!"));
    factory.register_bean_definition(
        "advisor".to_string(),
        advisor_definition("execution(* Foo.greet(..))", "interceptor"),
    );
    factory.register_bean_definition(
        "fooBean".to_string(),
        BeanDefinition::with_default(foo_type())
            .with_property(PropertyValue::literal("salutation", "hello")),
    );

    let foo = factory.get_bean_as::<dyn Greeting>("fooBean").unwrap();
    let interceptor = factory
        .get_bean_typed::<CountingInterceptor>("interceptor")
        .unwrap();

    assert_eq!(foo.greet("world".to_string()), "hello, world!");
    assert_eq!(interceptor.calls(), 1);
    assert_eq!(foo.greet("sprig".to_string()), "hello, sprig!");
    assert_eq!(interceptor.calls(), 2);

    // 未匹配的方法直接转发
    assert_eq!(foo.farewell(), "bye");
    assert_eq!(interceptor.calls(), 2);

    let bean = factory.get_bean("fooBean").unwrap();
    assert!(bean.downcast::<AdvisedProxy>().is_some());
    assert!(bean.downcast::<Foo>().is_none());
}

#[test]
fn advisors_and_interceptors_are_never_proxied() {
    let factory = factory_with_auto_proxy();
    factory.register_bean_definition("interceptor".to_string(), interceptor_definition(""));
    factory.register_bean_definition(
        "advisor".to_string(),
        advisor_definition("within(*)", "interceptor"),
    );

    let advisor = factory.get_bean("advisor").unwrap();
    let interceptor = factory.get_bean("interceptor").unwrap();

    assert!(advisor.downcast::<ExpressionPointcutAdvisor>().is_some());
    assert!(interceptor.downcast::<CountingInterceptor>().is_some());
}

#[test]
fn first_matching_advisor_wins() {
    let factory = factory_with_auto_proxy();
    factory.register_bean_definition("first".to_string(), interceptor_definition(" [first]"));
    factory.register_bean_definition("second".to_string(), interceptor_definition(" [second]"));
    factory.register_bean_definition(
        "nonMatching".to_string(),
        advisor_definition("within(Bar)", "second"),
    );
    factory.register_bean_definition(
        "firstAdvisor".to_string(),
        advisor_definition("within(Foo)", "first"),
    );
    factory.register_bean_definition(
        "secondAdvisor".to_string(),
        advisor_definition("execution(* Greeting.*(..))", "second"),
    );
    factory.register_bean_definition("fooBean".to_string(), BeanDefinition::with_default(foo_type()));

    let foo = factory.get_bean_as::<dyn Greeting>("fooBean").unwrap();

    assert_eq!(foo.farewell(), "bye [first]");
    assert_eq!(factory.get_bean_typed::<CountingInterceptor>("first").unwrap().calls(), 1);
    assert_eq!(factory.get_bean_typed::<CountingInterceptor>("second").unwrap().calls(), 0);
}

#[test]
fn unmatched_bean_is_returned_unchanged() {
    let factory = factory_with_auto_proxy();
    factory.register_bean_definition("interceptor".to_string(), interceptor_definition("!"));
    factory.register_bean_definition(
        "advisor".to_string(),
        advisor_definition("within(Foo)", "interceptor"),
    );
    factory.register_bean_definition(
        "barBean".to_string(),
        BeanDefinition::with_default(
            BeanType::of::<Bar>().implements_proxied::<dyn Greeting>(|bean| bean),
        ),
    );

    let bar = factory.get_bean("barBean").unwrap();

    assert!(bar.downcast::<Bar>().is_some());
    assert_eq!(bar.view::<dyn Greeting>().unwrap().farewell(), "bar leaves");
}

#[test]
fn references_and_type_scans_see_the_proxy() {
    let factory = factory_with_auto_proxy();
    factory.register_bean_definition("interceptor".to_string(), interceptor_definition("?"));
    factory.register_bean_definition(
        "advisor".to_string(),
        advisor_definition("execution(* Greeting.farewell(..))", "interceptor"),
    );
    factory.register_bean_definition(
        "audience".to_string(),
        BeanDefinition::with_default(BeanType::of::<Audience>())
            .with_property(PropertyValue::reference("greeting", "fooBean")),
    );
    factory.register_bean_definition("fooBean".to_string(), BeanDefinition::with_default(foo_type()));

    let audience = factory.get_bean_typed::<Audience>("audience").unwrap();
    let injected = audience.greeting.as_ref().unwrap();
    let direct = factory.get_bean_as::<dyn Greeting>("fooBean").unwrap();

    assert!(Arc::ptr_eq(injected, &direct));
    assert_eq!(injected.farewell(), "bye?");

    // 代理保留目标的声明类型
    assert_eq!(
        factory.get_bean_names_for_type(TypeId::of::<Foo>()),
        vec!["fooBean".to_string()]
    );
    let greetings = factory.get_beans_of_type::<dyn Greeting>().unwrap();
    assert_eq!(greetings.len(), 1);
    assert!(Arc::ptr_eq(&greetings[0], &direct));
}

#[test]
fn advisor_discovery_reentering_the_bean_is_fatal() {
    let factory = factory_with_auto_proxy();
    // Advisor 的通知引用了正在被检查的 Bean 本身
    factory.register_bean_definition(
        "advisor".to_string(),
        advisor_definition("within(Foo)", "fooBean"),
    );
    factory.register_bean_definition("fooBean".to_string(), BeanDefinition::with_default(foo_type()));

    let error = factory.get_bean("fooBean").unwrap_err();

    assert!(matches!(
        error.root_cause(),
        ContainerError::CurrentlyInCreation { name, .. } if name == "fooBean"
    ));
    assert_eq!(factory.get_singleton_count(), 1);
}

const BEANS: &str = r#"
[[bean]]
name = "autoProxyCreator"
type = "AdvisorAutoProxyCreator"

[[bean]]
name = "loggingInterceptor"
type = "LoggingInterceptor"

[[bean.property]]
name = "slow_threshold_ms"
value = 5000

[[bean]]
name = "loggingAdvisor"
type = "ExpressionPointcutAdvisor"

[[bean.property]]
name = "expression"
value = "execution(* Greeting.greet(..)) && !within(Bar)"

[[bean.property]]
name = "advice"
ref = "loggingInterceptor"

[[bean]]
name = "fooBean"
type = "Foo"

[[bean.property]]
name = "salutation"
value = "hi"

[[bean]]
name = "barBean"
type = "Bar"
"#;

#[test]
fn context_refresh_wires_auto_proxying_from_toml() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("aop.toml"), BEANS).unwrap();

    let mut types = TypeRegistry::new();
    sprig_aop::register_types(&mut types)
        .register_default("Foo", foo_type())
        .register_default(
            "Bar",
            BeanType::of::<Bar>().implements_proxied::<dyn Greeting>(|bean| bean),
        );

    let context = ApplicationContext::builder()
        .type_registry(types)
        .base_dir(dir.path())
        .location("aop.toml")
        .build()
        .unwrap();
    context.refresh().unwrap();

    assert_eq!(context.get_bean_factory().get_bean_post_processors().len(), 1);

    let foo = context.get_bean("fooBean").unwrap();
    assert!(foo.downcast::<AdvisedProxy>().is_some());
    assert_eq!(
        foo.view::<dyn Greeting>().unwrap().greet("there".to_string()),
        "hi, there"
    );

    let bar = context.get_bean("barBean").unwrap();
    assert!(bar.downcast::<Bar>().is_some());

    context.close();
    assert!(matches!(
        context.get_bean("fooBean"),
        Err(ContainerError::ContextClosed)
    ));
}

#[test]
fn repeated_refresh_keeps_a_single_proxy_layer() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("counting.toml"),
        r#"
[[bean]]
name = "autoProxyCreator"
type = "AdvisorAutoProxyCreator"

[[bean]]
name = "interceptor"
type = "CountingInterceptor"

[[bean]]
name = "advisor"
type = "ExpressionPointcutAdvisor"

[[bean.property]]
name = "expression"
value = "execution(* Greeting.greet(..))"

[[bean.property]]
name = "advice"
ref = "interceptor"

[[bean]]
name = "fooBean"
type = "Foo"
"#,
    )
    .unwrap();

    let mut types = TypeRegistry::new();
    sprig_aop::register_types(&mut types)
        .register_default("Foo", foo_type())
        .register_default(
            "CountingInterceptor",
            BeanType::of::<CountingInterceptor>()
                .implements::<dyn MethodInterceptor>(|interceptor| interceptor),
        );

    let context = ApplicationContext::builder()
        .type_registry(types)
        .base_dir(dir.path())
        .location("counting.toml")
        .build()
        .unwrap();
    context.refresh().unwrap();

    assert!(matches!(context.refresh(), Err(ContainerError::AlreadyRefreshed)));
    assert_eq!(context.get_bean_factory().get_bean_post_processors().len(), 1);

    let foo = context.get_bean_as::<dyn Greeting>("fooBean").unwrap();
    let interceptor = context
        .get_bean_typed::<CountingInterceptor>("interceptor")
        .unwrap();

    foo.greet("once".to_string());
    assert_eq!(interceptor.calls(), 1);
}
