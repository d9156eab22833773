//! Bean 定义读取
//!
//! 定义文件只能引用类型名，具体类型由 [`TypeRegistry`] 提供。
//!
//! ```toml
//! [[bean]]
//! name = "helloWorldService"
//! type = "HelloWorldServiceImpl"
//!
//! [[bean.property]]
//! name = "text"
//! value = "Hello World!"
//!
//! [[bean.property]]
//! name = "outputService"
//! ref = "outputService"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::bean::{BeanDefinition, BeanTypeBuilder, Injectable, TypeRegistration};
use crate::error::{ContainerError, ContainerResult};
use crate::property::{PropertyValue, Value};
use crate::resource::{Resource, ResourceLoader};

/// 定义读取器 - 把一个位置加载为有序的 (名称, 定义) 列表
pub trait BeanDefinitionReader: Send + Sync {
    fn load_bean_definitions(&self, location: &str) -> ContainerResult<Vec<(String, BeanDefinition)>>;
}

/// 类型注册表 - 定义文件中的类型名到 `BeanType` + 工厂的映射
#[derive(Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeRegistration>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个类型，同名注册会覆盖
    pub fn register<T, F>(&mut self, name: impl Into<String>, bean_type: BeanTypeBuilder<T>, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn() -> ContainerResult<T> + Send + Sync + 'static,
    {
        self.register_type(name, TypeRegistration::new(bean_type, factory))
    }

    /// 以 `Default` 为工厂注册
    pub fn register_default<T: Injectable + Default>(
        &mut self,
        name: impl Into<String>,
        bean_type: BeanTypeBuilder<T>,
    ) -> &mut Self {
        self.register(name, bean_type, || Ok(T::default()))
    }

    pub fn register_type(&mut self, name: impl Into<String>, registration: TypeRegistration) -> &mut Self {
        let name = name.into();
        if self.types.insert(name.clone(), registration).is_some() {
            tracing::warn!("Type '{}' registered twice, keeping the latest registration", name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeRegistration> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// 按字母序排列的类型名
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BeansDocument {
    #[serde(default, rename = "bean")]
    beans: Vec<BeanEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BeanEntry {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, rename = "property")]
    properties: Vec<PropertyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertyEntry {
    name: String,
    value: Option<toml::Value>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

fn convert_value(value: toml::Value) -> Result<Value, String> {
    match value {
        toml::Value::String(s) => Ok(Value::String(s)),
        toml::Value::Integer(i) => Ok(Value::Int(i)),
        toml::Value::Float(f) => Ok(Value::Float(f)),
        toml::Value::Boolean(b) => Ok(Value::Bool(b)),
        toml::Value::Array(items) => items
            .into_iter()
            .map(convert_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        toml::Value::Datetime(dt) => Ok(Value::String(dt.to_string())),
        toml::Value::Table(_) => Err("tables are not supported as property values".to_string()),
    }
}

/// TOML 格式的定义读取器
#[derive(Debug, Clone)]
pub struct TomlBeanDefinitionReader {
    resource_loader: ResourceLoader,
    types: Arc<TypeRegistry>,
}

impl TomlBeanDefinitionReader {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            resource_loader: ResourceLoader::new(),
            types,
        }
    }

    pub fn with_resource_loader(mut self, resource_loader: ResourceLoader) -> Self {
        self.resource_loader = resource_loader;
        self
    }

    pub fn resource_loader(&self) -> &ResourceLoader {
        &self.resource_loader
    }

    /// 从资源加载定义
    pub fn load_from_resource(&self, resource: &dyn Resource) -> ContainerResult<Vec<(String, BeanDefinition)>> {
        let content = resource.read_to_string()?;
        self.parse(resource.location(), &content)
    }

    /// 解析 TOML 文本
    pub fn parse(&self, location: &str, content: &str) -> ContainerResult<Vec<(String, BeanDefinition)>> {
        let load_failed = |reason: String| ContainerError::DefinitionLoadFailed {
            location: location.to_string(),
            reason,
        };

        let document: BeansDocument = toml::from_str(content).map_err(|e| load_failed(e.to_string()))?;

        let mut definitions = Vec::with_capacity(document.beans.len());
        for bean in document.beans {
            if bean.name.trim().is_empty() {
                return Err(load_failed("bean name must not be empty".to_string()));
            }

            let registration = self.types.get(&bean.type_name).ok_or_else(|| {
                load_failed(format!(
                    "bean '{}' has unknown type '{}'",
                    bean.name, bean.type_name
                ))
            })?;

            let mut definition = registration.definition();
            for property in bean.properties {
                let property_value = match (property.value, property.reference) {
                    (Some(value), None) => {
                        let value = convert_value(value).map_err(|reason| {
                            load_failed(format!(
                                "property '{}' of bean '{}': {}",
                                property.name, bean.name, reason
                            ))
                        })?;
                        PropertyValue::literal(property.name, value)
                    }
                    (None, Some(reference)) => PropertyValue::reference(property.name, reference),
                    _ => {
                        return Err(load_failed(format!(
                            "property '{}' of bean '{}' must have exactly one of 'value' or 'ref'",
                            property.name, bean.name
                        )))
                    }
                };
                definition.add_property_value(property_value);
            }

            tracing::trace!("Loaded definition '{}' of type '{}'", bean.name, bean.type_name);
            definitions.push((bean.name, definition));
        }

        tracing::debug!("Loaded {} bean definition(s) from '{}'", definitions.len(), location);
        Ok(definitions)
    }
}

impl BeanDefinitionReader for TomlBeanDefinitionReader {
    fn load_bean_definitions(&self, location: &str) -> ContainerResult<Vec<(String, BeanDefinition)>> {
        let resource = self.resource_loader.get_resource(location);
        self.load_from_resource(resource.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanType;
    use crate::property::{PropertySource, ResolvedValue};
    use crate::resource::ByteArrayResource;

    #[derive(Default)]
    struct Greeting {
        text: String,
    }

    impl Injectable for Greeting {
        fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
            match name {
                "text" => self.text = value.into_string()?,
                _ => return Err(ContainerError::no_such_property("Greeting", name)),
            }
            Ok(())
        }
    }

    fn reader() -> TomlBeanDefinitionReader {
        let mut types = TypeRegistry::new();
        types.register_default("Greeting", BeanType::of::<Greeting>());
        TomlBeanDefinitionReader::new(Arc::new(types))
    }

    #[test]
    fn test_parse_definitions_in_order() {
        let definitions = reader()
            .parse(
                "inline",
                r#"
                [[bean]]
                name = "second"
                type = "Greeting"

                [[bean]]
                name = "first"
                type = "Greeting"

                [[bean.property]]
                name = "text"
                value = "hi"

                [[bean.property]]
                name = "other"
                ref = "second"
                "#,
            )
            .unwrap();

        let names: Vec<_> = definitions.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);

        let properties = definitions[1].1.property_values();
        assert_eq!(properties.len(), 2);
        assert!(matches!(
            properties.get("text").unwrap().source(),
            PropertySource::Literal(Value::String(s)) if s == "hi"
        ));
        assert!(matches!(
            properties.get("other").unwrap().source(),
            PropertySource::Reference(reference) if reference.name() == "second"
        ));
    }

    #[test]
    fn test_unknown_type() {
        let error = reader()
            .parse("inline", "[[bean]]\nname = \"x\"\ntype = \"Missing\"\n")
            .unwrap_err();

        match error {
            ContainerError::DefinitionLoadFailed { location, reason } => {
                assert_eq!(location, "inline");
                assert!(reason.contains("unknown type 'Missing'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_property_with_value_and_ref() {
        let error = reader()
            .parse(
                "inline",
                r#"
                [[bean]]
                name = "x"
                type = "Greeting"

                [[bean.property]]
                name = "text"
                value = "hi"
                ref = "other"
                "#,
            )
            .unwrap_err();

        assert!(matches!(
            error,
            ContainerError::DefinitionLoadFailed { ref reason, .. } if reason.contains("exactly one")
        ));
    }

    #[test]
    fn test_malformed_document() {
        let error = reader().parse("inline", "[[bean]\nname =").unwrap_err();
        assert!(matches!(error, ContainerError::DefinitionLoadFailed { .. }));
    }

    #[test]
    fn test_load_from_resource() {
        let resource = ByteArrayResource::new("memory", "[[bean]]\nname = \"g\"\ntype = \"Greeting\"\n");
        let definitions = reader().load_from_resource(&resource).unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].1.bean_type().short_name(), "Greeting");
    }

    #[test]
    fn test_array_values() {
        let definitions = reader()
            .parse(
                "inline",
                "[[bean]]\nname = \"g\"\ntype = \"Greeting\"\n[[bean.property]]\nname = \"tags\"\nvalue = [\"a\", 1]\n",
            )
            .unwrap();

        assert!(matches!(
            definitions[0].1.property_values().get("tags").unwrap().source(),
            PropertySource::Literal(Value::List(items)) if items.len() == 2
        ));
    }
}
