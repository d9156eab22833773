//! Bean 的类型描述、实例句柄与定义
//!
//! Rust 没有运行时反射，所以"声明类型"由 [`BeanType`] 显式描述：
//! 具体类型的 `TypeId`、类型名，以及它对外暴露的接口（trait object）列表。
//! 每个接口绑定都携带一个转换函数，可选地携带一个代理织入函数（由 AOP 模块提供）。

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::bean_factory::ListableBeanFactory;
use crate::error::{ContainerError, ContainerResult};
use crate::property::{PropertyValue, PropertyValues, ResolvedValue};

/// 容器中共享的 Bean 对象
pub type SharedObject = Arc<dyn Any + Send + Sync>;

/// 接口视图：内部保存的是 `Arc<dyn Trait>`
pub type View = Arc<dyn Any + Send + Sync>;

/// 代理织入函数
///
/// 参数是一个不透明的代理描述（由 AOP 模块定义），返回该接口的代理视图。
pub type Weaver = Arc<dyn Fn(&dyn Any) -> Option<View> + Send + Sync>;

type CastFn = Arc<dyn Fn(&SharedObject) -> Option<View> + Send + Sync>;

/// 去掉模块路径，得到类型的短名称
///
/// `dyn my_app::service::Greeter` -> `Greeter`，`my_app::Foo<u8>` -> `Foo`
pub fn short_type_name(full: &'static str) -> &'static str {
    let without_dyn = full.strip_prefix("dyn ").unwrap_or(full);
    let without_generics = match without_dyn.find('<') {
        Some(index) => &without_dyn[..index],
        None => without_dyn,
    };
    match without_generics.rfind("::") {
        Some(index) => &without_generics[index + 2..],
        None => without_generics,
    }
}

/// 接口绑定 - 描述一个具体类型如何以某个 trait object 的形式暴露
#[derive(Clone)]
pub struct InterfaceBinding {
    type_id: TypeId,
    name: &'static str,
    full_name: &'static str,
    cast: CastFn,
    weaver: Option<Weaver>,
}

impl InterfaceBinding {
    /// 创建接口绑定
    ///
    /// `cast` 通常写成 `|bean| bean`，由编译器完成 `Arc<T>` 到 `Arc<dyn I>` 的转换。
    pub fn new<T, I>(cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        T: Any + Send + Sync,
        I: ?Sized + Send + Sync + 'static,
    {
        let full_name = std::any::type_name::<I>();
        Self {
            type_id: TypeId::of::<I>(),
            name: short_type_name(full_name),
            full_name,
            cast: Arc::new(move |object: &SharedObject| {
                Arc::clone(object)
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(cast(concrete)) as View)
            }),
            weaver: None,
        }
    }

    /// 设置代理织入函数
    pub fn with_weaver(mut self, weaver: Weaver) -> Self {
        self.weaver = Some(weaver);
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 接口短名称，例如 `Greeter`
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn full_name(&self) -> &'static str {
        self.full_name
    }

    pub fn weaver(&self) -> Option<&Weaver> {
        self.weaver.as_ref()
    }

    /// 将具体对象转换为该接口的视图
    pub fn cast(&self, object: &SharedObject) -> Option<View> {
        (self.cast)(object)
    }
}

impl fmt::Debug for InterfaceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceBinding")
            .field("name", &self.full_name)
            .field("proxyable", &self.weaver.is_some())
            .finish()
    }
}

/// Bean 的声明类型
#[derive(Clone)]
pub struct BeanType {
    type_id: TypeId,
    type_name: &'static str,
    short_name: &'static str,
    interfaces: Vec<InterfaceBinding>,
}

impl BeanType {
    /// 开始描述类型 `T`
    ///
    /// ```rust,ignore
    /// let bean_type = BeanType::of::<ConsoleGreeter>()
    ///     .implements::<dyn Greeter>(|bean| bean)
    ///     .build();
    /// ```
    pub fn of<T: Any + Send + Sync>() -> BeanTypeBuilder<T> {
        let type_name = std::any::type_name::<T>();
        BeanTypeBuilder {
            bean_type: BeanType {
                type_id: TypeId::of::<T>(),
                type_name,
                short_name: short_type_name(type_name),
                interfaces: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整类型路径
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 不带模块路径的类型名
    pub fn short_name(&self) -> &'static str {
        self.short_name
    }

    pub fn interfaces(&self) -> &[InterfaceBinding] {
        &self.interfaces
    }

    pub fn interface(&self, type_id: TypeId) -> Option<&InterfaceBinding> {
        self.interfaces.iter().find(|binding| binding.type_id == type_id)
    }

    /// 类型本身或其任一接口是否为 `type_id`
    pub fn is_assignable_to(&self, type_id: TypeId) -> bool {
        self.type_id == type_id || self.interface(type_id).is_some()
    }

    pub fn implements<I: ?Sized + 'static>(&self) -> bool {
        self.is_assignable_to(TypeId::of::<I>())
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanType")
            .field("type_name", &self.type_name)
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// [`BeanType`] 构建器，保留具体类型参数以便类型安全地声明接口
pub struct BeanTypeBuilder<T> {
    bean_type: BeanType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanTypeBuilder<T> {
    /// 声明 `T` 以接口 `I` 的形式暴露
    pub fn implements<I>(self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.bind(InterfaceBinding::new(cast))
    }

    /// 添加一个已构造好的接口绑定（同一接口重复声明时后者覆盖前者）
    pub fn bind(mut self, binding: InterfaceBinding) -> Self {
        self.bean_type
            .interfaces
            .retain(|existing| existing.type_id != binding.type_id);
        self.bean_type.interfaces.push(binding);
        self
    }

    pub fn build(self) -> BeanType {
        self.bean_type
    }
}

impl<T> From<BeanTypeBuilder<T>> for BeanType {
    fn from(builder: BeanTypeBuilder<T>) -> Self {
        builder.bean_type
    }
}

/// Bean 实例句柄
///
/// 克隆开销很小；同一个 Bean 的所有句柄共享同一个对象（单例标识）。
#[derive(Clone)]
pub struct BeanInstance {
    object: SharedObject,
    bean_type: Arc<BeanType>,
    views: Arc<HashMap<TypeId, View>>,
}

impl BeanInstance {
    /// 用声明类型的接口绑定为对象计算所有视图
    pub fn new(object: SharedObject, bean_type: Arc<BeanType>) -> Self {
        let views = bean_type
            .interfaces
            .iter()
            .filter_map(|binding| binding.cast(&object).map(|view| (binding.type_id, view)))
            .collect();
        Self::with_views(object, bean_type, views)
    }

    /// 用现成的视图构造实例（代理对象使用）
    pub fn with_views(
        object: SharedObject,
        bean_type: Arc<BeanType>,
        views: HashMap<TypeId, View>,
    ) -> Self {
        Self {
            object,
            bean_type,
            views: Arc::new(views),
        }
    }

    pub fn object(&self) -> &SharedObject {
        &self.object
    }

    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.bean_type
    }

    /// 以具体类型访问（代理对象无法以目标的具体类型访问）
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    /// 以接口访问
    pub fn view<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.views
            .get(&TypeId::of::<I>())
            .and_then(|view| view.downcast_ref::<Arc<I>>())
            .cloned()
    }

    /// 未类型化的接口视图
    pub fn raw_view(&self, type_id: TypeId) -> Option<&View> {
        self.views.get(&type_id)
    }

    /// 运行时对象是否暴露了该接口
    pub fn has_interface(&self, type_id: TypeId) -> bool {
        self.views.contains_key(&type_id)
    }

    /// 两个句柄是否指向同一个对象
    pub fn ptr_eq(&self, other: &BeanInstance) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for BeanInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanInstance")
            .field("type_name", &self.bean_type.type_name)
            .field("views", &self.views.len())
            .finish()
    }
}

/// 可由容器装配的类型
///
/// 替代反射式的属性写入：类型自己决定如何接收命名属性。
///
/// ```rust,ignore
/// impl Injectable for UserService {
///     fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
///         match name {
///             "repository" => self.repository = Some(value.into_interface::<dyn UserRepository>()?),
///             "greeting" => self.greeting = value.into_string()?,
///             _ => return Err(ContainerError::no_such_property("UserService", name)),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Injectable: Any + Send + Sync {
    /// 写入一个已解析的属性值
    fn set_property(&mut self, name: &str, _value: ResolvedValue) -> ContainerResult<()> {
        Err(ContainerError::no_such_property(
            std::any::type_name::<Self>(),
            name,
        ))
    }

    /// BeanFactoryAware 回调，在属性注入之前调用
    fn set_bean_factory(&mut self, _factory: Weak<dyn ListableBeanFactory>) {}
}

/// 刚构造、尚未共享的 Bean
pub trait RawBean: Send + Sync {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()>;

    fn set_bean_factory(&mut self, factory: Weak<dyn ListableBeanFactory>);

    /// 装配完成后转换为共享对象
    fn into_shared(self: Box<Self>) -> SharedObject;
}

impl<T: Injectable> RawBean for T {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        Injectable::set_property(self, name, value)
    }

    fn set_bean_factory(&mut self, factory: Weak<dyn ListableBeanFactory>) {
        Injectable::set_bean_factory(self, factory)
    }

    fn into_shared(self: Box<Self>) -> SharedObject {
        let shared: Arc<T> = Arc::from(self);
        shared
    }
}

/// 实例工厂 - 替代默认构造函数
pub trait InstanceFactory: Send + Sync {
    /// 创建一个新的原始实例
    fn create(&self) -> ContainerResult<Box<dyn RawBean>>;

    fn type_name(&self) -> &'static str;
}

/// 简单的函数工厂实现
pub struct FunctionFactory<T, F> {
    factory_fn: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> FunctionFactory<T, F>
where
    T: Injectable,
    F: Fn() -> ContainerResult<T> + Send + Sync,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> InstanceFactory for FunctionFactory<T, F>
where
    T: Injectable,
    F: Fn() -> ContainerResult<T> + Send + Sync,
{
    fn create(&self) -> ContainerResult<Box<dyn RawBean>> {
        let instance = (self.factory_fn)()?;
        Ok(Box::new(instance))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// 一个类型的注册信息：声明类型 + 工厂
///
/// 由 [`TypeRegistry`](crate::reader::TypeRegistry) 持有，
/// 每次加载定义时生成新的 [`BeanDefinition`]。
#[derive(Clone)]
pub struct TypeRegistration {
    bean_type: Arc<BeanType>,
    factory: Arc<dyn InstanceFactory>,
}

impl TypeRegistration {
    pub fn new<T, F>(bean_type: BeanTypeBuilder<T>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn() -> ContainerResult<T> + Send + Sync + 'static,
    {
        Self {
            bean_type: Arc::new(bean_type.build()),
            factory: Arc::new(FunctionFactory::new(factory)),
        }
    }

    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.bean_type
    }

    /// 生成一个没有属性值的新定义
    pub fn definition(&self) -> BeanDefinition {
        BeanDefinition {
            bean_type: Arc::clone(&self.bean_type),
            factory: Arc::clone(&self.factory),
            property_values: PropertyValues::new(),
            slot: BeanSlot::default(),
        }
    }
}

impl fmt::Debug for TypeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistration")
            .field("bean_type", &self.bean_type)
            .field("factory", &self.factory.type_name())
            .finish()
    }
}

/// 单例的创建阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeanState {
    /// 尚未创建
    Pending,
    /// 原始实例已构造，属性尚未注入
    Constructed,
    /// 属性已注入，后置处理器尚未完成
    Wired,
    /// 已缓存，可以对外提供
    Ready,
}

impl BeanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeanState::Pending => "pending",
            BeanState::Constructed => "constructed",
            BeanState::Wired => "wired",
            BeanState::Ready => "ready",
        }
    }
}

/// 单例缓存槽
///
/// `instance` 只写一次；`creation` 是可重入锁：同一线程的重入请求能看到当前阶段并报错，
/// 其他线程则阻塞等待，保证只构造一次。
pub(crate) struct BeanSlot {
    pub(crate) instance: OnceCell<BeanInstance>,
    pub(crate) creation: ReentrantMutex<Cell<BeanState>>,
}

impl Default for BeanSlot {
    fn default() -> Self {
        Self {
            instance: OnceCell::new(),
            creation: ReentrantMutex::new(Cell::new(BeanState::Pending)),
        }
    }
}

/// Bean 定义 - 描述如何创建和装配 Bean
pub struct BeanDefinition {
    bean_type: Arc<BeanType>,
    factory: Arc<dyn InstanceFactory>,
    property_values: PropertyValues,
    pub(crate) slot: BeanSlot,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义
    pub fn new<T, F>(bean_type: BeanTypeBuilder<T>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn() -> ContainerResult<T> + Send + Sync + 'static,
    {
        TypeRegistration::new(bean_type, factory).definition()
    }

    /// 使用 `Default` 作为工厂
    pub fn with_default<T: Injectable + Default>(bean_type: BeanTypeBuilder<T>) -> Self {
        Self::new(bean_type, || Ok(T::default()))
    }

    /// 追加属性值
    pub fn with_property(mut self, property_value: PropertyValue) -> Self {
        self.property_values.add(property_value);
        self
    }

    pub fn add_property_value(&mut self, property_value: PropertyValue) {
        self.property_values.add(property_value);
    }

    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.bean_type
    }

    pub fn property_values(&self) -> &PropertyValues {
        &self.property_values
    }

    pub(crate) fn factory(&self) -> &Arc<dyn InstanceFactory> {
        &self.factory
    }

    /// 已缓存的单例（如果已创建）
    pub fn cached_instance(&self) -> Option<BeanInstance> {
        self.slot.instance.get().cloned()
    }

    /// 当前创建阶段
    ///
    /// 如果其他线程正在创建该 Bean，此调用会等待其完成。
    pub fn state(&self) -> BeanState {
        if self.slot.instance.get().is_some() {
            return BeanState::Ready;
        }
        self.slot.creation.lock().get()
    }

    /// 复制出一个未实例化的定义（清空缓存与已解析的引用）
    pub(crate) fn reset(&self) -> BeanDefinition {
        BeanDefinition {
            bean_type: Arc::clone(&self.bean_type),
            factory: Arc::clone(&self.factory),
            property_values: self.property_values.unresolved(),
            slot: BeanSlot::default(),
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("type_name", &self.bean_type.type_name)
            .field("property_values", &self.property_values)
            .field("instantiated", &self.slot.instance.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    #[derive(Default)]
    struct Console {
        prefix: String,
    }

    impl Greeter for Console {
        fn greet(&self) -> String {
            format!("{}hello", self.prefix)
        }
    }

    impl Named for Console {
        fn name(&self) -> &str {
            "console"
        }
    }

    impl Injectable for Console {}

    fn console_type() -> Arc<BeanType> {
        Arc::new(
            BeanType::of::<Console>()
                .implements::<dyn Greeter>(|bean| bean)
                .implements::<dyn Named>(|bean| bean)
                .build(),
        )
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_app::service::Foo"), "Foo");
        assert_eq!(short_type_name("dyn my_app::Greeter"), "Greeter");
        assert_eq!(short_type_name("my_app::Wrapper<alloc::string::String>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_bean_type_assignability() {
        let bean_type = console_type();

        assert!(bean_type.is_assignable_to(TypeId::of::<Console>()));
        assert!(bean_type.implements::<dyn Greeter>());
        assert!(bean_type.implements::<dyn Named>());
        assert!(!bean_type.implements::<String>());
        assert_eq!(bean_type.short_name(), "Console");
        assert_eq!(bean_type.interfaces().len(), 2);
    }

    #[test]
    fn test_duplicate_interface_binding_is_replaced() {
        let bean_type = BeanType::of::<Console>()
            .implements::<dyn Greeter>(|bean| bean)
            .implements::<dyn Greeter>(|bean| bean)
            .build();

        assert_eq!(bean_type.interfaces().len(), 1);
    }

    #[test]
    fn test_instance_views_share_identity() {
        let object: SharedObject = Arc::new(Console {
            prefix: "> ".to_string(),
        });
        let instance = BeanInstance::new(object, console_type());

        let greeter = instance.view::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "> hello");
        assert_eq!(instance.view::<dyn Named>().unwrap().name(), "console");

        let concrete = instance.downcast::<Console>().unwrap();
        assert_eq!(concrete.prefix, "> ");

        let copy = instance.clone();
        assert!(copy.ptr_eq(&instance));
        assert!(instance.downcast::<String>().is_none());
    }

    #[test]
    fn test_default_set_property_rejects_unknown_property() {
        let mut console = Console::default();
        let error = Injectable::set_property(
            &mut console,
            "volume",
            ResolvedValue::Literal(crate::property::Value::Int(3)),
        )
        .unwrap_err();

        assert!(matches!(error, ContainerError::NoSuchProperty { ref property, .. } if property == "volume"));
    }

    #[test]
    fn test_definition_starts_pending() {
        let definition = BeanDefinition::with_default(BeanType::of::<Console>());

        assert_eq!(definition.state(), BeanState::Pending);
        assert!(definition.cached_instance().is_none());
        assert!(definition.property_values().is_empty());
    }
}
