//! 连接点（JoinPoint）定义
//!
//! 连接点表示代理上的一次方法调用

use std::any::Any;
use std::fmt;
use std::time::Instant;

/// 方法标识：声明该方法的接口名 + 方法名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    declaring_type: &'static str,
    name: &'static str,
}

impl Method {
    pub const fn new(declaring_type: &'static str, name: &'static str) -> Self {
        Self {
            declaring_type,
            name,
        }
    }

    /// 声明该方法的接口（trait）名
    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

/// 连接点信息
#[derive(Debug, Clone)]
pub struct JoinPoint {
    /// 目标 Bean 的类型名称
    pub target_type: &'static str,

    /// 被调用的方法
    pub method: Method,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    pub fn new(target_type: &'static str, method: Method) -> Self {
        Self {
            target_type,
            method,
            timestamp: Instant::now(),
        }
    }

    /// 获取完整的方法签名，例如 `ConsoleGreeter::greet`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type, self.method.name())
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 类型擦除后的原始调用
trait Invocable {
    fn arguments(&self) -> &dyn Any;

    fn proceed(self: Box<Self>) -> Box<dyn Any>;
}

struct Call<A, F> {
    args: A,
    call: F,
}

impl<A, F> Invocable for Call<A, F>
where
    A: 'static,
    F: FnOnce(A) -> Box<dyn Any>,
{
    fn arguments(&self) -> &dyn Any {
        &self.args
    }

    fn proceed(self: Box<Self>) -> Box<dyn Any> {
        let Call { args, call } = *self;
        call(args)
    }
}

/// 一次被拦截的方法调用
///
/// 参数以元组形式保存，例如 `fn greet(&self, name: String, times: u32)` 的参数类型是
/// `(String, u32)`。`proceed` 消耗调用本身，所以目标方法最多执行一次。
pub struct MethodInvocation<'a> {
    join_point: JoinPoint,
    target: &'a (dyn Any + Send + Sync),
    call: Box<dyn Invocable + 'a>,
}

impl<'a> MethodInvocation<'a> {
    pub(crate) fn new<A, F>(
        join_point: JoinPoint,
        target: &'a (dyn Any + Send + Sync),
        args: A,
        call: F,
    ) -> Self
    where
        A: 'static,
        F: FnOnce(A) -> Box<dyn Any> + 'a,
    {
        Self {
            join_point,
            target,
            call: Box::new(Call { args, call }),
        }
    }

    pub fn join_point(&self) -> &JoinPoint {
        &self.join_point
    }

    pub fn method(&self) -> &Method {
        &self.join_point.method
    }

    /// 目标对象（未被代理的原始 Bean）
    pub fn target(&self) -> &'a (dyn Any + Send + Sync) {
        self.target
    }

    /// 以具体类型访问目标对象
    pub fn target_as<T: Any>(&self) -> Option<&'a T> {
        self.target.downcast_ref::<T>()
    }

    /// 以参数元组类型访问参数
    pub fn arguments<T: Any>(&self) -> Option<&T> {
        self.call.arguments().downcast_ref::<T>()
    }

    /// 调用目标方法，返回装箱的返回值
    pub fn proceed(self) -> Box<dyn Any> {
        tracing::trace!("Proceeding to {}", self.join_point);
        self.call.proceed()
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("join_point", &self.join_point)
            .finish()
    }
}
