use std::sync::Arc;

use sprig_aop::prelude::*;
use sprig_core::prelude::*;

// ==================== 接口定义 ====================

proxy_interface! {
    /// 问候服务 - 方法调用可被 AOP 拦截
    pub trait HelloWorldService {
        fn say_hello(&self) -> String;
        fn say_to(&self, name: String) -> String;
        fn describe(&self) -> String;
    }
}

pub trait OutputService: Send + Sync {
    fn render(&self, text: &str) -> String;
}

// ==================== 业务实现 ====================

#[derive(Default)]
struct ConsoleOutputService {
    prefix: String,
}

impl OutputService for ConsoleOutputService {
    fn render(&self, text: &str) -> String {
        format!("{}{}", self.prefix, text)
    }
}

impl Injectable for ConsoleOutputService {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "prefix" => self.prefix = value.into_string()?,
            _ => return Err(ContainerError::no_such_property("ConsoleOutputService", name)),
        }
        Ok(())
    }
}

#[derive(Default)]
struct HelloWorldServiceImpl {
    text: String,
    repeat: u32,
    output_service: Option<Arc<dyn OutputService>>,
}

impl HelloWorldServiceImpl {
    fn render(&self, text: &str) -> String {
        match &self.output_service {
            Some(output) => output.render(text),
            None => text.to_string(),
        }
    }
}

impl HelloWorldService for HelloWorldServiceImpl {
    fn say_hello(&self) -> String {
        let line = vec![self.text.as_str(); self.repeat.max(1) as usize].join(" ");
        self.render(&line)
    }

    fn say_to(&self, name: String) -> String {
        self.render(&format!("{}, {}", self.text, name))
    }

    fn describe(&self) -> String {
        format!("HelloWorldServiceImpl(repeat = {})", self.repeat)
    }
}

impl Injectable for HelloWorldServiceImpl {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "text" => self.text = value.into_string()?,
            "repeat" => {
                let repeat = value.into_i64()?;
                self.repeat = u32::try_from(repeat)
                    .map_err(|_| ContainerError::type_mismatch("u32", repeat.to_string()))?;
            }
            "output_service" => {
                self.output_service = Some(value.into_interface::<dyn OutputService>()?)
            }
            _ => return Err(ContainerError::no_such_property("HelloWorldServiceImpl", name)),
        }
        Ok(())
    }
}

fn type_registry() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    sprig_aop::register_types(&mut types)
        .register_default(
            "ConsoleOutputService",
            BeanType::of::<ConsoleOutputService>().implements::<dyn OutputService>(|bean| bean),
        )
        .register_default(
            "HelloWorldServiceImpl",
            BeanType::of::<HelloWorldServiceImpl>()
                .implements_proxied::<dyn HelloWorldService>(|bean| bean),
        );
    types
}

// ==================== 主程序 ====================

fn main() -> anyhow::Result<()> {
    // SPRIG_LOG_LEVEL / SPRIG_LOG_FORMAT / RUST_LOG
    LoggingConfig::from_env().init()?;

    let context = ApplicationContext::builder()
        .type_registry(type_registry())
        .base_dir(env!("CARGO_MANIFEST_DIR"))
        .location("beans.toml")
        .build()?;
    context.refresh()?;

    tracing::info!(
        "Context refreshed with {} bean definitions: {:?}",
        context.get_bean_definition_count(),
        context.get_bean_names()
    );

    let service = context.get_bean_as::<dyn HelloWorldService>("helloWorldService")?;

    // say* 方法经过 LoggingInterceptor，describe 直接转发
    println!("{}", service.say_hello());
    println!("{}", service.say_to("sprig".to_string()));
    println!("{}", service.describe());

    context.close();
    Ok(())
}
