//! 切点（Pointcut）表达式系统
//!
//! 支持的表达式语法：
//!
//! - `execution(* HelloService.say*(..))`：类型 + 方法名模式，返回类型与参数列表不参与匹配
//! - `within(*Service)`：类型模式
//! - `&&`、`||`、`!` 以及括号
//!
//! 类型模式默认匹配短类型名（或接口名）；包含 `::` 时匹配完整路径。
//! 类型模式中的 `.` 视为路径分隔符，所以 `execution(* app.service.HelloService.*(..))`
//! 与 `execution(* app::service::HelloService.*(..))` 等价。

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use sprig_core::bean::short_type_name;
use sprig_core::{BeanType, ContainerError, ContainerResult};

use crate::joinpoint::Method;

/// 名称模式（支持 `*` 通配符），构造时预编译为正则表达式
#[derive(Clone)]
pub struct NamePattern {
    pattern: String,
    regex: Regex,
    qualified: bool,
}

impl NamePattern {
    /// 编译模式
    ///
    /// - `*` - 匹配任意字符串
    /// - `User*` - 以 User 开头
    /// - `*Service` - 以 Service 结尾
    pub fn new(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("empty name pattern".to_string());
        }
        if let Some(invalid) = pattern
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '*' | ':')))
        {
            return Err(format!("invalid character '{}' in pattern '{}'", invalid, pattern));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| e.to_string())?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            qualified: pattern.contains("::"),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// 按类型名匹配：带路径的模式匹配完整路径，否则匹配短名称
    pub fn matches_type_name(&self, full_name: &'static str) -> bool {
        if self.qualified {
            self.matches(full_name.strip_prefix("dyn ").unwrap_or(full_name))
        } else {
            self.matches(short_type_name(full_name))
        }
    }

    /// 类型本身或它暴露的任一接口是否匹配
    fn matches_bean_type(&self, bean_type: &BeanType) -> bool {
        self.matches_type_name(bean_type.type_name())
            || bean_type
                .interfaces()
                .iter()
                .any(|binding| self.matches_type_name(binding.full_name()))
    }

    /// 方法级别：匹配具体类型时接受任意接口的方法，否则必须匹配声明该方法的接口
    fn matches_method_owner(&self, method: &Method, bean_type: &BeanType) -> bool {
        if self.matches_type_name(bean_type.type_name()) {
            return true;
        }
        let declaring = method.declaring_type();
        self.matches_type_name(declaring)
            || bean_type.interfaces().iter().any(|binding| {
                short_type_name(binding.full_name()) == short_type_name(declaring)
                    && self.matches_type_name(binding.full_name())
            })
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.pattern)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

type CustomMatcher = Arc<dyn Fn(&Method, &BeanType) -> bool + Send + Sync>;

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法
    Within(NamePattern),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: NamePattern,
        method_pattern: NamePattern,
    },

    /// 自定义匹配函数
    Custom(CustomMatcher),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 解析表达式文本
    pub fn parse(expression: &str) -> ContainerResult<Self> {
        Parser {
            expression,
            rest: expression,
        }
        .parse()
    }

    pub fn custom<F>(matcher: F) -> Self
    where
        F: Fn(&Method, &BeanType) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Custom(Arc::new(matcher))
    }

    /// 类型级别的匹配：该类型上是否可能有方法被匹配
    pub fn matches_type(&self, bean_type: &BeanType) -> bool {
        match self {
            PointcutExpression::All | PointcutExpression::Custom(_) => true,
            PointcutExpression::Within(pattern) => pattern.matches_bean_type(bean_type),
            PointcutExpression::Execution { type_pattern, .. } => {
                type_pattern.matches_bean_type(bean_type)
            }
            PointcutExpression::And(left, right) => {
                left.matches_type(bean_type) && right.matches_type(bean_type)
            }
            PointcutExpression::Or(left, right) => {
                left.matches_type(bean_type) || right.matches_type(bean_type)
            }
            // 只有完全由类型决定的子表达式才能在类型级别取反
            PointcutExpression::Not(inner) => {
                inner.type_only_result(bean_type).map_or(true, |matched| !matched)
            }
        }
    }

    /// 方法级别的匹配
    pub fn matches_method(&self, method: &Method, bean_type: &BeanType) -> bool {
        match self {
            PointcutExpression::All => true,
            PointcutExpression::Within(pattern) => pattern.matches_bean_type(bean_type),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                type_pattern.matches_method_owner(method, bean_type)
                    && method_pattern.matches(method.name())
            }
            PointcutExpression::Custom(matcher) => matcher(method, bean_type),
            PointcutExpression::And(left, right) => {
                left.matches_method(method, bean_type) && right.matches_method(method, bean_type)
            }
            PointcutExpression::Or(left, right) => {
                left.matches_method(method, bean_type) || right.matches_method(method, bean_type)
            }
            PointcutExpression::Not(inner) => !inner.matches_method(method, bean_type),
        }
    }

    fn type_only_result(&self, bean_type: &BeanType) -> Option<bool> {
        match self {
            PointcutExpression::All => Some(true),
            PointcutExpression::Within(pattern) => Some(pattern.matches_bean_type(bean_type)),
            PointcutExpression::Execution { .. } | PointcutExpression::Custom(_) => None,
            PointcutExpression::And(left, right) => {
                match (left.type_only_result(bean_type), right.type_only_result(bean_type)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }
            }
            PointcutExpression::Or(left, right) => {
                match (left.type_only_result(bean_type), right.type_only_result(bean_type)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
            PointcutExpression::Not(inner) => inner.type_only_result(bean_type).map(|v| !v),
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::Within(p) => write!(f, "Within({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => write!(f, "Execution({}.{})", type_pattern, method_pattern),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 递归下降解析器
///
/// ```text
/// or      := and ("||" and)*
/// and     := unary ("&&" unary)*
/// unary   := "!" unary | primary
/// primary := "(" or ")" | designator "(" body ")"
/// ```
struct Parser<'a> {
    expression: &'a str,
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> ContainerResult<PointcutExpression> {
        let expression = self.parse_or()?;
        self.skip_whitespace();
        if !self.rest.is_empty() {
            return Err(self.error(format!("unexpected input '{}'", self.rest)));
        }
        Ok(expression)
    }

    fn error(&self, reason: impl Into<String>) -> ContainerError {
        ContainerError::InvalidPointcut {
            expression: self.expression.to_string(),
            reason: reason.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        match self.rest.strip_prefix(token) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn parse_or(&mut self) -> ContainerResult<PointcutExpression> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            left = left.or(self.parse_and()?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ContainerResult<PointcutExpression> {
        let mut left = self.parse_unary()?;
        while self.eat("&&") {
            left = left.and(self.parse_unary()?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ContainerResult<PointcutExpression> {
        if self.eat("!") {
            return Ok(self.parse_unary()?.not());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ContainerResult<PointcutExpression> {
        if self.eat("(") {
            let inner = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("missing ')'"));
            }
            return Ok(inner);
        }

        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.rest.len());
        let (designator, rest) = self.rest.split_at(end);
        if designator.is_empty() {
            return Err(if rest.is_empty() {
                self.error("unexpected end of expression")
            } else {
                self.error(format!("unexpected input '{}'", rest))
            });
        }
        self.rest = rest;

        if !self.eat("(") {
            return Err(self.error(format!("expected '(' after '{}'", designator)));
        }
        let body = self.take_balanced()?;

        match designator {
            "execution" => self.execution(body),
            "within" => Ok(PointcutExpression::Within(
                self.type_pattern(body.trim())?,
            )),
            other => Err(self.error(format!("unsupported designator '{}'", other))),
        }
    }

    /// 取出到匹配的 `)` 为止的内容，并消耗该 `)`
    fn take_balanced(&mut self) -> ContainerResult<&'a str> {
        let rest = self.rest;
        let mut depth = 0usize;
        for (index, c) in rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    self.rest = &rest[index + 1..];
                    return Ok(&rest[..index]);
                }
                ')' => depth -= 1,
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    /// `[修饰符] [返回类型] 类型.方法(参数)`
    fn execution(&self, body: &str) -> ContainerResult<PointcutExpression> {
        let body = body.trim();
        let open = match body.find('(') {
            Some(open) if body.ends_with(')') => open,
            _ => return Err(self.error("execution() requires a parameter list such as '(..)'")),
        };

        let target = body[..open]
            .split_whitespace()
            .last()
            .ok_or_else(|| self.error("execution() requires a method pattern"))?;

        let (type_pattern, method_pattern) = match target.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => (type_pattern, method_pattern),
            None => ("*", target),
        };

        Ok(PointcutExpression::Execution {
            type_pattern: self.type_pattern(type_pattern)?,
            method_pattern: NamePattern::new(method_pattern).map_err(|reason| self.error(reason))?,
        })
    }

    fn type_pattern(&self, pattern: &str) -> ContainerResult<NamePattern> {
        NamePattern::new(&pattern.replace('.', "::")).map_err(|reason| self.error(reason))
    }
}

/// 类型过滤器
pub trait ClassFilter: Send + Sync {
    fn matches(&self, bean_type: &BeanType) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    fn matches(&self, method: &Method, bean_type: &BeanType) -> bool;
}

impl ClassFilter for PointcutExpression {
    fn matches(&self, bean_type: &BeanType) -> bool {
        self.matches_type(bean_type)
    }
}

impl MethodMatcher for PointcutExpression {
    fn matches(&self, method: &Method, bean_type: &BeanType) -> bool {
        self.matches_method(method, bean_type)
    }
}

/// 切点：类型过滤器 + 方法匹配器
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> &dyn ClassFilter;

    /// 方法匹配器会被代理长期持有
    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;
}

/// 基于表达式的切点
#[derive(Clone)]
pub struct ExpressionPointcut {
    expression: String,
    root: Arc<PointcutExpression>,
}

impl ExpressionPointcut {
    pub fn new(expression: &str) -> ContainerResult<Self> {
        Ok(Self {
            expression: expression.trim().to_string(),
            root: Arc::new(PointcutExpression::parse(expression)?),
        })
    }

    /// 从已构造的表达式创建
    pub fn from_expression(root: PointcutExpression) -> Self {
        Self {
            expression: format!("{:?}", root),
            root: Arc::new(root),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn root(&self) -> &PointcutExpression {
        &self.root
    }
}

/// 默认切点不匹配任何东西
impl Default for ExpressionPointcut {
    fn default() -> Self {
        Self {
            expression: String::new(),
            root: Arc::new(PointcutExpression::All.not()),
        }
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &*self.root
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.root.clone()
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionPointcut")
            .field("expression", &self.expression)
            .field("root", &self.root)
            .finish()
    }
}
