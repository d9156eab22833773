//! 应用上下文
//!
//! `refresh()` 把定义加载、后置处理器注册和单例预实例化串成一个完整的启动过程。

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanInstance};
use crate::bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory,
    ListableBeanFactory,
};
use crate::bean_post_processor::BeanPostProcessor;
use crate::error::{ContainerError, ContainerResult};
use crate::reader::{BeanDefinitionReader, TomlBeanDefinitionReader, TypeRegistry};
use crate::resource::ResourceLoader;

/// 上下文生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// 已创建，尚未刷新
    Created,
    /// 刷新成功
    Active,
    /// 已关闭（显式关闭或刷新失败）
    Closed,
}

struct LocatedReader {
    reader: Arc<dyn BeanDefinitionReader>,
    location: String,
}

/// 应用上下文 - 持有 BeanFactory 与定义来源
pub struct ApplicationContext {
    /// Bean 工厂 - 负责 Bean 的创建和管理
    bean_factory: Arc<DefaultListableBeanFactory>,

    /// 刷新时依次读取的定义来源
    readers: Vec<LocatedReader>,

    state: RwLock<ContextState>,
}

impl ApplicationContext {
    /// 创建没有定义来源的上下文
    pub fn new() -> Self {
        Self {
            bean_factory: DefaultListableBeanFactory::new(),
            readers: Vec::new(),
            state: RwLock::new(ContextState::Created),
        }
    }

    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    /// 获取内部的 BeanFactory
    pub fn get_bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn state(&self) -> ContextState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ContextState::Active
    }

    /// 直接注册定义（通常在 `refresh()` 之前）
    pub fn register_bean_definition(&self, name: impl Into<String>, definition: BeanDefinition) {
        self.bean_factory.register_bean_definition(name.into(), definition);
    }

    /// 刷新上下文
    ///
    /// 1. 从所有定义来源加载定义
    /// 2. 实例化所有 BeanPostProcessor 类型的 Bean 并按注册顺序加入管道
    /// 3. 预实例化所有单例
    ///
    /// 任一步骤失败，上下文丢弃已创建的单例并进入 `Closed` 状态。
    /// 已经刷新过的上下文返回 `AlreadyRefreshed`，状态不变。
    pub fn refresh(&self) -> ContainerResult<()> {
        match self.state() {
            ContextState::Created => {}
            ContextState::Active => return Err(ContainerError::AlreadyRefreshed),
            ContextState::Closed => return Err(ContainerError::ContextClosed),
        }

        tracing::info!("Refreshing application context");

        match self.do_refresh() {
            Ok(()) => {
                *self.state.write() = ContextState::Active;
                tracing::info!(
                    "Application context refreshed with {} bean(s)",
                    self.bean_factory.get_bean_definition_count()
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Application context refresh failed: {}", e);
                self.bean_factory.destroy_singletons();
                *self.state.write() = ContextState::Closed;
                Err(e)
            }
        }
    }

    fn do_refresh(&self) -> ContainerResult<()> {
        self.load_bean_definitions()?;
        self.register_bean_post_processors()?;
        self.bean_factory.preinstantiate_singletons()
    }

    fn load_bean_definitions(&self) -> ContainerResult<()> {
        for located in &self.readers {
            tracing::debug!("Loading bean definitions from '{}'", located.location);
            let definitions = located.reader.load_bean_definitions(&located.location)?;
            for (name, definition) in definitions {
                self.bean_factory.register_bean_definition(name, definition);
            }
        }
        Ok(())
    }

    /// 后置处理器只作用于在它注册之后创建的 Bean，
    /// 所以排在前面的处理器 Bean 不会被后面的处理器处理。
    fn register_bean_post_processors(&self) -> ContainerResult<()> {
        let names = self
            .bean_factory
            .get_bean_names_for_type(TypeId::of::<dyn BeanPostProcessor>());
        tracing::debug!("Registering {} bean post-processor(s)", names.len());

        for name in names {
            let processor = self.bean_factory.get_bean_as::<dyn BeanPostProcessor>(&name)?;
            tracing::debug!("  ├─ {} ({})", name, processor.name());
            self.bean_factory.add_bean_post_processor(processor);
        }
        Ok(())
    }

    /// 关闭上下文，丢弃所有单例
    pub fn close(&self) {
        let mut state = self.state.write();
        if *state == ContextState::Closed {
            return;
        }
        *state = ContextState::Closed;
        drop(state);

        tracing::info!("Closing application context");
        self.bean_factory.destroy_singletons();
    }

    fn ensure_open(&self) -> ContainerResult<()> {
        match self.state() {
            ContextState::Closed => Err(ContainerError::ContextClosed),
            _ => Ok(()),
        }
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

// 委托给 BeanFactory
impl BeanFactory for ApplicationContext {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.ensure_open()?;
        self.bean_factory.get_bean(name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }
}

impl ListableBeanFactory for ApplicationContext {
    fn get_bean_names(&self) -> Vec<String> {
        self.bean_factory.get_bean_names()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        self.bean_factory.get_bean_names_for_type(type_id)
    }

    fn get_beans_for_type(&self, type_id: TypeId) -> ContainerResult<Vec<BeanInstance>> {
        self.ensure_open()?;
        self.bean_factory.get_beans_for_type(type_id)
    }

    fn get_bean_definition_count(&self) -> usize {
        self.bean_factory.get_bean_definition_count()
    }
}

/// 应用上下文构建器
pub struct ApplicationContextBuilder {
    definitions: Vec<(String, BeanDefinition)>,
    readers: Vec<LocatedReader>,
    locations: Vec<String>,
    type_registry: Option<Arc<TypeRegistry>>,
    resource_loader: ResourceLoader,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            readers: Vec::new(),
            locations: Vec::new(),
            type_registry: None,
            resource_loader: ResourceLoader::new(),
        }
    }

    /// 注册 Bean 定义
    pub fn register(mut self, name: impl Into<String>, definition: BeanDefinition) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    /// TOML 定义文件使用的类型注册表
    pub fn type_registry(mut self, types: TypeRegistry) -> Self {
        self.type_registry = Some(Arc::new(types));
        self
    }

    /// 相对路径的基础目录
    pub fn base_dir(mut self, base_dir: impl Into<std::path::PathBuf>) -> Self {
        self.resource_loader = ResourceLoader::with_base_dir(base_dir);
        self
    }

    /// 添加一个 TOML 定义文件位置
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    /// 添加自定义读取器
    pub fn reader(mut self, reader: Arc<dyn BeanDefinitionReader>, location: impl Into<String>) -> Self {
        self.readers.push(LocatedReader {
            reader,
            location: location.into(),
        });
        self
    }

    /// 构建上下文（不刷新）
    pub fn build(self) -> ContainerResult<Arc<ApplicationContext>> {
        let mut readers = self.readers;

        if !self.locations.is_empty() {
            let types = self.type_registry.ok_or_else(|| {
                ContainerError::Other(anyhow::anyhow!(
                    "a type registry is required to load definition files"
                ))
            })?;
            let toml_reader: Arc<dyn BeanDefinitionReader> = Arc::new(
                TomlBeanDefinitionReader::new(types).with_resource_loader(self.resource_loader),
            );
            readers.extend(self.locations.into_iter().map(|location| LocatedReader {
                reader: Arc::clone(&toml_reader),
                location,
            }));
        }

        let context = ApplicationContext {
            readers,
            ..ApplicationContext::new()
        };
        for (name, definition) in self.definitions {
            context.register_bean_definition(name, definition);
        }

        Ok(Arc::new(context))
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
