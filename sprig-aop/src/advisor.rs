//! Advisor：切点 + 通知

use std::sync::Arc;

use sprig_core::{BeanType, BeanTypeBuilder, ContainerError, ContainerResult, Injectable, ResolvedValue};

use crate::advice::MethodInterceptor;
use crate::error::AopError;
use crate::pointcut::{ExpressionPointcut, Pointcut};

/// Advisor trait
///
/// 自动代理创建器按注册顺序遍历容器中所有的 Advisor，
/// 第一个类型过滤器匹配的 Advisor 决定代理使用的通知。
pub trait Advisor: Send + Sync {
    fn pointcut(&self) -> &dyn Pointcut;

    fn advice(&self) -> ContainerResult<Arc<dyn MethodInterceptor>>;
}

/// 基于切点表达式的 Advisor
///
/// 作为 Bean 声明时支持两个属性：
/// - `expression`：切点表达式（字面量）
/// - `advice`：通知 Bean 的引用，该 Bean 必须暴露 `dyn MethodInterceptor`
///
/// ```toml
/// [[bean]]
/// name = "loggingAdvisor"
/// type = "ExpressionPointcutAdvisor"
///
/// [[bean.property]]
/// name = "expression"
/// value = "execution(* HelloWorldService.*(..))"
///
/// [[bean.property]]
/// name = "advice"
/// ref = "loggingInterceptor"
/// ```
#[derive(Default)]
pub struct ExpressionPointcutAdvisor {
    pointcut: ExpressionPointcut,
    advice: Option<Arc<dyn MethodInterceptor>>,
}

impl ExpressionPointcutAdvisor {
    pub fn new(expression: &str, advice: Arc<dyn MethodInterceptor>) -> ContainerResult<Self> {
        Ok(Self {
            pointcut: ExpressionPointcut::new(expression)?,
            advice: Some(advice),
        })
    }

    /// 声明类型：暴露 `dyn Advisor`
    pub fn bean_type() -> BeanTypeBuilder<Self> {
        BeanType::of::<Self>().implements::<dyn Advisor>(|advisor| advisor)
    }

    pub fn set_expression(&mut self, expression: &str) -> ContainerResult<()> {
        self.pointcut = ExpressionPointcut::new(expression)?;
        Ok(())
    }

    pub fn set_advice(&mut self, advice: Arc<dyn MethodInterceptor>) {
        self.advice = Some(advice);
    }

    pub fn expression(&self) -> &str {
        self.pointcut.expression()
    }
}

impl Advisor for ExpressionPointcutAdvisor {
    fn pointcut(&self) -> &dyn Pointcut {
        &self.pointcut
    }

    fn advice(&self) -> ContainerResult<Arc<dyn MethodInterceptor>> {
        self.advice.clone().ok_or_else(|| {
            AopError::AdviceNotConfigured {
                advisor: format!("ExpressionPointcutAdvisor({})", self.pointcut.expression()),
            }
            .into()
        })
    }
}

impl Injectable for ExpressionPointcutAdvisor {
    fn set_property(&mut self, name: &str, value: ResolvedValue) -> ContainerResult<()> {
        match name {
            "expression" => self.set_expression(&value.into_string()?),
            "advice" => {
                self.set_advice(value.into_interface::<dyn MethodInterceptor>()?);
                Ok(())
            }
            _ => Err(ContainerError::no_such_property("ExpressionPointcutAdvisor", name)),
        }
    }
}
