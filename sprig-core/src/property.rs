//! 属性值与属性解析
//!
//! 属性值要么是字面量，要么是对另一个 Bean 的引用。引用在首次解析时通过
//! BeanFactory 查找并缓存在引用对象上；所属 Bean 创建失败时缓存被清空。

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::BeanInstance;
use crate::bean_factory::BeanFactory;
use crate::error::{ContainerError, ContainerResult};

/// 字面量值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    /// 值的种类名称，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// 整数，字符串形式的整数也会被接受
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// 对另一个 Bean 的命名引用，解析结果只计算一次
pub struct BeanReference {
    name: String,
    resolved: RwLock<Option<BeanInstance>>,
}

impl BeanReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolved: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已解析的目标（如果已解析）
    pub fn resolved(&self) -> Option<BeanInstance> {
        self.resolved.read().clone()
    }

    /// 通过 BeanFactory 解析目标，结果被缓存
    pub fn resolve(&self, factory: &dyn BeanFactory) -> ContainerResult<BeanInstance> {
        if let Some(bean) = self.resolved() {
            return Ok(bean);
        }
        let bean = factory.get_bean(&self.name)?;
        Ok(self.resolved.write().get_or_insert(bean).clone())
    }

    /// 丢弃缓存的目标，下次解析重新查找
    pub(crate) fn reset(&self) {
        self.resolved.write().take();
    }

    /// 同名但未解析的副本
    pub fn unresolved(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl fmt::Debug for BeanReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanReference")
            .field("name", &self.name)
            .field("resolved", &self.resolved.read().is_some())
            .finish()
    }
}

/// 属性值来源
#[derive(Debug)]
pub enum PropertySource {
    Literal(Value),
    Reference(BeanReference),
}

/// 命名的属性值
#[derive(Debug)]
pub struct PropertyValue {
    name: String,
    source: PropertySource,
}

impl PropertyValue {
    pub fn literal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Literal(value.into()),
        }
    }

    pub fn reference(name: impl Into<String>, bean_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Reference(BeanReference::new(bean_name)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &PropertySource {
        &self.source
    }

    fn unresolved(&self) -> Self {
        let source = match &self.source {
            PropertySource::Literal(value) => PropertySource::Literal(value.clone()),
            PropertySource::Reference(reference) => PropertySource::Reference(reference.unresolved()),
        };
        Self {
            name: self.name.clone(),
            source,
        }
    }
}

/// 有序的属性值列表，按声明顺序注入
#[derive(Debug, Default)]
pub struct PropertyValues {
    values: Vec<PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: PropertyValue) {
        self.values.push(value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|value| value.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn unresolved(&self) -> Self {
        Self {
            values: self.values.iter().map(PropertyValue::unresolved).collect(),
        }
    }

    /// 清空所有引用的解析缓存
    pub(crate) fn reset_references(&self) {
        for value in &self.values {
            if let PropertySource::Reference(reference) = &value.source {
                reference.reset();
            }
        }
    }
}

impl FromIterator<PropertyValue> for PropertyValues {
    fn from_iter<I: IntoIterator<Item = PropertyValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// 解析后的属性值，交给 [`Injectable::set_property`](crate::bean::Injectable::set_property)
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    Literal(Value),
    Bean(BeanInstance),
}

impl ResolvedValue {
    fn kind(&self) -> String {
        match self {
            ResolvedValue::Literal(value) => value.kind().to_string(),
            ResolvedValue::Bean(bean) => format!("bean of type {}", bean.bean_type().short_name()),
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ResolvedValue::Literal(value) => Some(value),
            ResolvedValue::Bean(_) => None,
        }
    }

    pub fn into_string(self) -> ContainerResult<String> {
        match self {
            ResolvedValue::Literal(Value::String(s)) => Ok(s),
            ResolvedValue::Literal(value @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(value.to_string())
            }
            other => Err(ContainerError::type_mismatch("string", other.kind())),
        }
    }

    pub fn into_i64(self) -> ContainerResult<i64> {
        match self.as_literal().and_then(Value::as_i64) {
            Some(value) => Ok(value),
            None => Err(ContainerError::type_mismatch("integer", self.kind())),
        }
    }

    pub fn into_f64(self) -> ContainerResult<f64> {
        match self.as_literal().and_then(Value::as_f64) {
            Some(value) => Ok(value),
            None => Err(ContainerError::type_mismatch("float", self.kind())),
        }
    }

    pub fn into_bool(self) -> ContainerResult<bool> {
        match self.as_literal().and_then(Value::as_bool) {
            Some(value) => Ok(value),
            None => Err(ContainerError::type_mismatch("boolean", self.kind())),
        }
    }

    pub fn into_list(self) -> ContainerResult<Vec<Value>> {
        match self {
            ResolvedValue::Literal(Value::List(items)) => Ok(items),
            other => Err(ContainerError::type_mismatch("list", other.kind())),
        }
    }

    pub fn into_bean(self) -> ContainerResult<BeanInstance> {
        match self {
            ResolvedValue::Bean(bean) => Ok(bean),
            other => Err(ContainerError::type_mismatch("bean reference", other.kind())),
        }
    }

    /// 以接口形式取出引用的 Bean
    pub fn into_interface<I: ?Sized + Send + Sync + 'static>(self) -> ContainerResult<Arc<I>> {
        let bean = self.into_bean()?;
        bean.view::<I>().ok_or_else(|| {
            ContainerError::type_mismatch(type_name::<I>(), bean.bean_type().type_name())
        })
    }

    /// 以具体类型取出引用的 Bean
    pub fn into_concrete<T: Send + Sync + 'static>(self) -> ContainerResult<Arc<T>> {
        let bean = self.into_bean()?;
        bean.downcast::<T>().ok_or_else(|| {
            ContainerError::type_mismatch(type_name::<T>(), bean.bean_type().type_name())
        })
    }
}

/// 属性解析器 - 将定义中的属性值转换为可注入的值
pub struct PropertyResolver<'a> {
    factory: &'a dyn BeanFactory,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(factory: &'a dyn BeanFactory) -> Self {
        Self { factory }
    }

    /// 字面量原样返回，引用通过 `get_bean` 解析（可能触发目标 Bean 的创建）
    pub fn resolve(&self, property_value: &PropertyValue) -> ContainerResult<ResolvedValue> {
        match &property_value.source {
            PropertySource::Literal(value) => Ok(ResolvedValue::Literal(value.clone())),
            PropertySource::Reference(reference) => {
                reference.resolve(self.factory).map(ResolvedValue::Bean)
            }
        }
    }
}
