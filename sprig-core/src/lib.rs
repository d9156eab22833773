// sprig-core: 轻量的 Bean 容器
//
// 提供：
// - 按名称注册的 Bean 定义与单例缓存
// - 字面量与 Bean 引用的属性注入
// - BeanPostProcessor 扩展管道
// - 基于 TOML 定义文件的应用上下文

pub mod bean;
pub mod bean_factory;
pub mod bean_post_processor;
pub mod context;
pub mod error;
pub mod logging;
pub mod property;
pub mod reader;
pub mod resource;

// 重新导出常用类型
pub use bean::{
    BeanDefinition, BeanInstance, BeanState, BeanType, BeanTypeBuilder, FunctionFactory,
    Injectable, InstanceFactory, InterfaceBinding, RawBean, SharedObject, TypeRegistration, View,
    Weaver,
};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory,
    ListableBeanFactory,
};
pub use bean_post_processor::BeanPostProcessor;
pub use context::{ApplicationContext, ApplicationContextBuilder, ContextState};
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use property::{
    BeanReference, PropertyResolver, PropertySource, PropertyValue, PropertyValues,
    ResolvedValue, Value,
};
pub use reader::{BeanDefinitionReader, TomlBeanDefinitionReader, TypeRegistry};
pub use resource::{ByteArrayResource, FileResource, Resource, ResourceLoader};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{BeanDefinition, BeanInstance, BeanType, Injectable};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, DefaultListableBeanFactory,
        ListableBeanFactory,
    };
    pub use crate::bean_post_processor::BeanPostProcessor;
    pub use crate::context::ApplicationContext;
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::property::{PropertyValue, ResolvedValue, Value};
    pub use crate::reader::TypeRegistry;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
