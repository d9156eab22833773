//! Bean Factory - 核心容器接口
//!
//! 按名称保存 Bean 定义，按需创建单例并缓存。创建流程：
//!
//! 1. 工厂函数构造原始实例
//! 2. BeanFactoryAware 回调
//! 3. 按声明顺序注入属性（引用会递归触发目标 Bean 的创建）
//! 4. 所有 BeanPostProcessor 的 before 钩子
//! 5. 所有 BeanPostProcessor 的 after 钩子
//! 6. 写入单例缓存
//!
//! 创建过程中不持有注册表锁，所以属性注入和后置处理器可以自由地回调容器。

use std::any::{type_name, Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{
    bean::{BeanDefinition, BeanInstance, BeanState, BeanType, RawBean},
    bean_post_processor::BeanPostProcessor,
    error::{ContainerError, ContainerResult},
    property::{PropertyResolver, PropertyValues},
};

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean，首次请求时创建
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 按注册顺序获取所有 Bean 的名称
    fn get_bean_names(&self) -> Vec<String>;

    /// 声明类型可赋值给 `type_id` 的 Bean 名称（按注册顺序）
    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String>;

    /// 按注册顺序获取（必要时创建）所有可赋值给 `type_id` 的 Bean
    fn get_beans_for_type(&self, type_id: TypeId) -> ContainerResult<Vec<BeanInstance>>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: ListableBeanFactory {
    /// 注册 Bean 定义
    ///
    /// 同名定义后注册者生效，保留原来的注册位置，旧定义的缓存实例被丢弃。
    fn register_bean_definition(&self, name: String, definition: BeanDefinition);

    /// 检查是否包含指定的 Bean 定义
    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 追加 BeanPostProcessor，只影响之后创建的 Bean
    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    /// 获取所有 BeanPostProcessor（注册顺序）
    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>>;

    /// 按注册顺序实例化所有单例，遇到第一个错误即返回
    fn preinstantiate_singletons(&self) -> ContainerResult<()>;

    /// 清空单例缓存，定义保留
    fn destroy_singletons(&self);
}

/// BeanFactoryExt - 泛型访问方法
///
/// 提供泛型方法，不能作为 trait object 使用；对所有 `ListableBeanFactory` 自动实现。
pub trait BeanFactoryExt: ListableBeanFactory {
    /// 以接口形式获取 Bean
    fn get_bean_as<I: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<I>> {
        let bean = self.get_bean(name)?;
        bean.view::<I>().ok_or_else(|| {
            ContainerError::type_mismatch(type_name::<I>(), bean.bean_type().type_name())
        })
    }

    /// 以具体类型获取 Bean
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        bean.downcast::<T>().ok_or_else(|| {
            ContainerError::type_mismatch(type_name::<T>(), bean.bean_type().type_name())
        })
    }

    /// 以接口形式获取所有实现了 `I` 的 Bean（注册顺序）
    fn get_beans_of_type<I: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<I>>> {
        self.get_beans_for_type(TypeId::of::<I>())?
            .into_iter()
            .map(|bean| {
                bean.view::<I>().ok_or_else(|| {
                    ContainerError::type_mismatch(type_name::<I>(), bean.bean_type().type_name())
                })
            })
            .collect()
    }
}

impl<F: ListableBeanFactory + ?Sized> BeanFactoryExt for F {}

#[derive(Default)]
struct Registry {
    definitions: HashMap<String, Arc<BeanDefinition>>,
    /// 注册顺序
    names: Vec<String>,
}

/// DefaultListableBeanFactory - 默认的 Bean 容器实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义与注册顺序
    registry: RwLock<Registry>,

    /// Bean 后置处理器列表（注册顺序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    /// 交给 BeanFactoryAware 的弱引用，避免 Bean 与容器之间的引用环
    self_ref: Weak<DefaultListableBeanFactory>,
}

/// 创建结束时，未完成的 Bean 回到 Pending 状态（包括 panic 的情况），
/// 并丢弃这次创建中解析到的引用
struct CreationGuard<'a> {
    state: &'a Cell<BeanState>,
    property_values: &'a PropertyValues,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.state.get() != BeanState::Ready {
            self.state.set(BeanState::Pending);
            self.property_values.reset_references();
        }
    }
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            registry: RwLock::new(Registry::default()),
            bean_post_processors: RwLock::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    fn definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.registry
            .read()
            .definitions
            .get(name)
            .cloned()
            .ok_or_else(|| {
                tracing::debug!("Bean '{}' not found in container", name);
                ContainerError::BeanNotFound(name.to_string())
            })
    }

    /// 获取 Bean 的声明类型
    pub fn get_bean_type(&self, name: &str) -> ContainerResult<Arc<BeanType>> {
        self.definition(name)
            .map(|definition| Arc::clone(definition.bean_type()))
    }

    /// 获取 Bean 当前的创建阶段
    pub fn get_bean_state(&self, name: &str) -> ContainerResult<BeanState> {
        self.definition(name).map(|definition| definition.state())
    }

    /// 已经实例化的单例数量
    pub fn get_singleton_count(&self) -> usize {
        self.registry
            .read()
            .definitions
            .values()
            .filter(|definition| definition.cached_instance().is_some())
            .count()
    }

    /// 创建 Bean 实例
    ///
    /// 调用方持有该 Bean 的创建锁；`state` 随创建推进。
    fn create_bean(
        &self,
        name: &str,
        definition: &BeanDefinition,
        state: &Cell<BeanState>,
    ) -> ContainerResult<BeanInstance> {
        // 1. 实例化
        let mut raw = definition
            .factory()
            .create()
            .map_err(|source| ContainerError::BeanCreationFailed {
                name: name.to_string(),
                source: Box::new(source),
            })?;
        state.set(BeanState::Constructed);

        // 2. BeanFactoryAware
        let factory: Weak<dyn ListableBeanFactory> = self.self_ref.clone();
        raw.set_bean_factory(factory);

        // 3. 属性注入
        self.apply_property_values(name, definition, raw.as_mut())?;
        state.set(BeanState::Wired);

        let bean = BeanInstance::new(raw.into_shared(), Arc::clone(definition.bean_type()));

        // 4. BeanPostProcessor.postProcessBeforeInitialization
        let bean = self.apply_bean_post_processors_before_initialization(bean, name)?;

        // 5. BeanPostProcessor.postProcessAfterInitialization
        self.apply_bean_post_processors_after_initialization(bean, name)
    }

    /// 按声明顺序解析并写入属性
    fn apply_property_values(
        &self,
        name: &str,
        definition: &BeanDefinition,
        raw: &mut dyn RawBean,
    ) -> ContainerResult<()> {
        let resolver = PropertyResolver::new(self);

        for property_value in definition.property_values().iter() {
            let property = property_value.name();
            tracing::trace!("Injecting property '{}' of bean '{}'", property, name);

            let value = resolver
                .resolve(property_value)
                .map_err(|source| injection_failed(name, property, source))?;
            raw.set_property(property, value)
                .map_err(|source| injection_failed(name, property, source))?;
        }

        Ok(())
    }

    /// 应用 BeanPostProcessor.postProcessBeforeInitialization
    fn apply_bean_post_processors_before_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        // 快照：钩子内部可以继续注册处理器而不会死锁
        let processors = self.get_bean_post_processors();
        let mut current_bean = bean;

        for processor in processors.iter() {
            current_bean = processor
                .post_process_before_initialization(current_bean, bean_name)
                .map_err(|source| post_processor_failed(processor.as_ref(), bean_name, source))?;
        }

        Ok(current_bean)
    }

    /// 应用 BeanPostProcessor.postProcessAfterInitialization
    fn apply_bean_post_processors_after_initialization(
        &self,
        bean: BeanInstance,
        bean_name: &str,
    ) -> ContainerResult<BeanInstance> {
        let processors = self.get_bean_post_processors();
        let mut current_bean = bean;

        for processor in processors.iter() {
            current_bean = processor
                .post_process_after_initialization(current_bean, bean_name)
                .map_err(|source| post_processor_failed(processor.as_ref(), bean_name, source))?;
        }

        Ok(current_bean)
    }
}

fn injection_failed(bean: &str, property: &str, source: ContainerError) -> ContainerError {
    ContainerError::PropertyInjectionFailed {
        bean: bean.to_string(),
        property: property.to_string(),
        source: Box::new(source),
    }
}

fn post_processor_failed(
    processor: &dyn BeanPostProcessor,
    bean: &str,
    source: ContainerError,
) -> ContainerError {
    ContainerError::PostProcessorFailed {
        processor: processor.name().to_string(),
        bean: bean.to_string(),
        source: Box::new(source),
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        tracing::trace!("Requesting bean: '{}'", name);

        let definition = self.definition(name)?;
        let slot = &definition.slot;

        if let Some(bean) = slot.instance.get() {
            return Ok(bean.clone());
        }

        // 同一线程可重入，其他线程在此等待正在进行的创建
        let creation = slot.creation.lock();

        if let Some(bean) = slot.instance.get() {
            tracing::debug!("Returning instance of singleton bean '{}' created concurrently", name);
            return Ok(bean.clone());
        }

        let phase = creation.get();
        if phase != BeanState::Pending {
            return Err(ContainerError::CurrentlyInCreation {
                name: name.to_string(),
                phase: phase.as_str(),
            });
        }

        let guard = CreationGuard {
            state: &*creation,
            property_values: definition.property_values(),
        };
        tracing::info!("Creating shared instance of singleton bean '{}'", name);

        let bean = self.create_bean(name, &definition, guard.state)?;
        let bean = slot.instance.get_or_init(|| bean).clone();
        guard.state.set(BeanState::Ready);

        tracing::debug!("Singleton bean '{}' created and cached", name);
        Ok(bean)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.registry.read().definitions.contains_key(name)
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.registry.read().names.clone()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        let registry = self.registry.read();
        registry
            .names
            .iter()
            .filter(|name| {
                registry
                    .definitions
                    .get(name.as_str())
                    .is_some_and(|definition| definition.bean_type().is_assignable_to(type_id))
            })
            .cloned()
            .collect()
    }

    fn get_beans_for_type(&self, type_id: TypeId) -> ContainerResult<Vec<BeanInstance>> {
        self.get_bean_names_for_type(type_id)
            .iter()
            .map(|name| self.get_bean(name))
            .collect()
    }

    fn get_bean_definition_count(&self) -> usize {
        self.registry.read().definitions.len()
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, name: String, definition: BeanDefinition) {
        tracing::trace!(
            "Registering bean: name='{}', type='{}'",
            name,
            definition.bean_type().type_name()
        );

        let previous = {
            let mut registry = self.registry.write();
            let previous = registry
                .definitions
                .insert(name.clone(), Arc::new(definition));
            if previous.is_none() {
                registry.names.push(name.clone());
            }
            previous
        };

        match previous {
            Some(previous) if previous.cached_instance().is_some() => tracing::warn!(
                "Overriding bean definition for '{}', discarding its cached instance",
                name
            ),
            Some(_) => tracing::warn!("Overriding bean definition for '{}'", name),
            None => tracing::debug!("Bean definition registered successfully: '{}'", name),
        }
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.contains_bean(name)
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        tracing::debug!("Adding bean post-processor '{}'", processor.name());
        self.bean_post_processors.write().push(processor);
    }

    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let bean_names = self.get_bean_names();
        tracing::debug!("Pre-instantiating {} singleton beans", bean_names.len());

        for name in bean_names {
            self.get_bean(&name)?;
        }

        Ok(())
    }

    fn destroy_singletons(&self) {
        tracing::info!("Destroying singleton beans");

        let discarded: Vec<Arc<BeanDefinition>> = {
            let mut registry = self.registry.write();
            registry
                .definitions
                .values_mut()
                .filter(|definition| definition.cached_instance().is_some())
                .map(|definition| {
                    let fresh = Arc::new(definition.reset());
                    std::mem::replace(definition, fresh)
                })
                .collect()
        };

        tracing::debug!("Discarded {} singleton instances", discarded.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::Injectable;
    use crate::property::{PropertyValue, ResolvedValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        start: i64,
    }

    impl Injectable for Counter {
        fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
            match name {
                "start" => self.start = value.into_i64()?,
                _ => return Err(ContainerError::no_such_property("Counter", name)),
            }
            Ok(())
        }
    }

    #[test]
    fn test_get_bean_caches_singleton() {
        let factory = DefaultListableBeanFactory::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);

        factory.register_bean_definition(
            "counter".to_string(),
            BeanDefinition::new(crate::bean::BeanType::of::<Counter>(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Counter::default())
            }),
        );

        let first = factory.get_bean("counter").unwrap();
        let second = factory.get_bean("counter").unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(factory.get_bean_state("counter").unwrap(), BeanState::Ready);
    }

    #[test]
    fn test_missing_bean() {
        let factory = DefaultListableBeanFactory::new();

        let error = factory.get_bean("nope").unwrap_err();
        assert!(matches!(error, ContainerError::BeanNotFound(ref name) if name == "nope"));
        assert_eq!(factory.get_bean_definition_count(), 0);
        assert_eq!(factory.get_singleton_count(), 0);
    }

    #[test]
    fn test_literal_property_injection() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(
            "counter".to_string(),
            BeanDefinition::with_default(crate::bean::BeanType::of::<Counter>())
                .with_property(PropertyValue::literal("start", 41)),
        );

        let counter = factory.get_bean_typed::<Counter>("counter").unwrap();
        assert_eq!(counter.start, 41);
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(
            "counter".to_string(),
            BeanDefinition::with_default(crate::bean::BeanType::of::<Counter>())
                .with_property(PropertyValue::literal("stop", 1)),
        );

        let error = factory.get_bean("counter").unwrap_err();
        assert!(matches!(
            error,
            ContainerError::PropertyInjectionFailed { ref property, .. } if property == "stop"
        ));
        assert!(matches!(error.root_cause(), ContainerError::NoSuchProperty { .. }));
        assert_eq!(factory.get_bean_state("counter").unwrap(), BeanState::Pending);
        assert_eq!(factory.get_singleton_count(), 0);
    }

    #[test]
    fn test_destroy_singletons_keeps_definitions() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(
            "counter".to_string(),
            BeanDefinition::with_default(crate::bean::BeanType::of::<Counter>()),
        );

        let before = factory.get_bean("counter").unwrap();
        factory.destroy_singletons();

        assert_eq!(factory.get_singleton_count(), 0);
        assert!(factory.contains_bean("counter"));

        let after = factory.get_bean("counter").unwrap();
        assert!(!before.ptr_eq(&after));
    }
}
