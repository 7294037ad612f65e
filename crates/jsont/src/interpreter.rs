/*
 * interpreter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Instruction dispatch.
//!
//! Every instruction runs through [`Context::execute`], which counts it
//! against the code limiter and turns unanticipated plugin failures into
//! UNEXPECTED_ERROR reports. Deliberate failures (`ExecuteError::Code`)
//! pass through untouched.

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{ErrorInfo, ExecuteError, ExecuteErrorType, TemplateError, TemplateResult};
use crate::expr::{Expr, ExprScope, ExprValue};
use crate::instructions::*;
use crate::node::Node;
use crate::repr;
use crate::variable::{VarName, Variable, Variables};

impl<'a> Context<'a> {
    /// Execute a whole template. Errors that abort the run are returned as
    /// [`TemplateError::Execute`].
    pub fn run(&mut self, code: &Instruction) -> TemplateResult<()> {
        self.execute(code).map_err(|err| match err {
            ExecuteError::Code(info) => TemplateError::Execute(info),
            ExecuteError::Plugin { name, message } => TemplateError::Execute(
                self.error(ExecuteErrorType::UnexpectedError)
                    .with_name(name)
                    .with_data(message),
            ),
        })
    }

    /// Execute a single instruction.
    pub fn execute(&mut self, inst: &Instruction) -> Result<(), ExecuteError> {
        let saved = self.current;
        if !matches!(inst, Instruction::Root(_)) {
            self.current = inst.pos();
        }
        let depth = self.depth();

        let result = match self.check_limit().and_then(|()| self.invoke(inst)) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.restore_depth(depth);
                match err {
                    ExecuteError::Code(info)
                        if !info.is_execute(ExecuteErrorType::GeneralError) =>
                    {
                        Err(ExecuteError::Code(info))
                    }
                    other => self.unexpected(inst, other),
                }
            }
        };
        self.current = saved;
        result
    }

    /// Execute a list of instructions in order.
    pub fn execute_block(&mut self, insts: &[Instruction]) -> Result<(), ExecuteError> {
        for inst in insts {
            self.execute(inst)?;
        }
        Ok(())
    }

    fn execute_alternative(&mut self, alt: &Option<Box<Instruction>>) -> Result<(), ExecuteError> {
        match alt {
            Some(inst) => self.execute(inst),
            None => Ok(()),
        }
    }

    fn unexpected(&mut self, inst: &Instruction, err: ExecuteError) -> Result<(), ExecuteError> {
        let (name, data) = match err {
            ExecuteError::Plugin { name, message } => (name, message),
            ExecuteError::Code(info) => (
                info.name.clone().unwrap_or_else(|| info.code().to_string()),
                info.data.clone().unwrap_or_else(|| info.detail()),
            ),
        };
        let error = self
            .error(ExecuteErrorType::UnexpectedError)
            .with_name(name)
            .with_data(data)
            .with_repr(repr::repr(inst, false));
        tracing::warn!(error = %error, "unexpected error during execution");
        if let Some(hook) = self.logging_hook() {
            hook.log(&error);
        }
        self.fail(error)
    }

    fn invoke(&mut self, inst: &Instruction) -> Result<(), ExecuteError> {
        match inst {
            Instruction::Root(root) => self.execute_block(&root.block.consequent),
            Instruction::Text(text) => {
                self.buffer_mut().push_str(&text.view);
                Ok(())
            }
            Instruction::Variable(var) => self.invoke_variable(var),
            Instruction::Section(section) => self.invoke_section(section),
            Instruction::Repeated(repeated) => self.invoke_repeated(repeated),
            Instruction::AlternatesWith(alt) => self.execute_block(&alt.block.consequent),
            Instruction::Predicate(pred) => {
                let taken = match &pred.call {
                    Some(call) => call.predicate.apply(self, &call.args)?,
                    None => true,
                };
                self.branch(taken, &pred.block)
            }
            Instruction::If(inst) => {
                let taken = self.if_chain(&inst.vars, &inst.ops);
                self.branch(taken, &inst.block)
            }
            Instruction::IfPredicate(inst) => {
                let taken = inst.call.predicate.apply(self, &inst.call.args)?;
                self.branch(taken, &inst.block)
            }
            Instruction::IfExpression(inst) => {
                let node = self.node();
                self.push(node);
                let (result, failures) = self.reduce(&inst.expr);
                self.pop();
                let taken = failures == 0 && result.is_some_and(|r| r.as_bool());
                self.branch(taken, &inst.block)
            }
            Instruction::BindVar(bind) => {
                let mut vars = self.resolve_vars(&bind.vars);
                self.apply_formatters(&bind.formatters, &mut vars)?;
                self.set_var(bind.name.clone(), vars.first());
                Ok(())
            }
            Instruction::CtxVar(ctx_var) => {
                let mut obj = Map::new();
                for binding in &ctx_var.bindings {
                    let node = self.resolve(&binding.var);
                    if !node.is_missing() {
                        obj.insert(binding.name.clone(), node.to_value());
                    }
                }
                self.set_var(ctx_var.name.clone(), Node::owned(Value::Object(obj)));
                Ok(())
            }
            Instruction::Eval(eval) => self.invoke_eval(eval),
            Instruction::Include(include) => self.invoke_include(include),
            Instruction::Inject(inject) => {
                let node = self.injectable(&inject.path);
                self.set_var(inject.variable.clone(), node);
                Ok(())
            }
            Instruction::Macro(mac) => {
                self.set_macro(mac.name.clone(), mac.body.clone());
                Ok(())
            }
            Instruction::Meta(meta) => {
                self.buffer_mut().push(if meta.left { '{' } else { '}' });
                Ok(())
            }
            Instruction::Literal(lit) => {
                self.buffer_mut().push_str(lit.kind.text());
                Ok(())
            }
            Instruction::Comment(_) | Instruction::End(_) | Instruction::Eof(_) => Ok(()),
        }
    }

    fn branch(&mut self, taken: bool, block: &Block) -> Result<(), ExecuteError> {
        if taken {
            self.execute_block(&block.consequent)
        } else {
            self.execute_alternative(&block.alternative)
        }
    }

    // ===================================================================
    // Variables and formatters
    // ===================================================================

    pub(crate) fn resolve_vars(&self, names: &[VarName]) -> Variables<'a> {
        Variables::new(
            names
                .iter()
                .map(|name| Variable::new(name.clone(), self.resolve(name)))
                .collect(),
        )
    }

    /// Run a formatter chain, counting each call against the limiter.
    pub fn apply_formatters(
        &mut self,
        formatters: &[FormatterCall],
        vars: &mut Variables<'a>,
    ) -> Result<(), ExecuteError> {
        for call in formatters {
            self.check_limit()?;
            call.formatter.apply(self, &call.args, vars)?;
        }
        Ok(())
    }

    fn invoke_variable(&mut self, var: &VariableInst) -> Result<(), ExecuteError> {
        let mut vars = self.resolve_vars(&var.vars);
        self.push(vars.first());
        self.apply_formatters(&var.formatters, &mut vars)?;
        let first = vars.first();
        first.emit(self.buffer_mut());
        self.pop();
        Ok(())
    }

    /// `{.if a || b && c}`: left to right, no precedence, short-circuiting.
    fn if_chain(&self, vars: &[VarName], ops: &[BoolOp]) -> bool {
        let Some((first, rest)) = vars.split_first() else {
            return false;
        };
        let mut result = self.resolve(first).is_truthy();
        for (var, op) in rest.iter().zip(ops) {
            match op {
                BoolOp::Or if result => break,
                BoolOp::And if !result => break,
                BoolOp::Or | BoolOp::And => result = self.resolve(var).is_truthy(),
            }
        }
        result
    }

    // ===================================================================
    // Sections
    // ===================================================================

    fn invoke_section(&mut self, section: &SectionInst) -> Result<(), ExecuteError> {
        let node = self.resolve_section(&section.var);
        if node.is_truthy() {
            self.push(node);
            self.execute_block(&section.block.consequent)?;
            self.pop();
            Ok(())
        } else {
            self.execute_alternative(&section.block.alternative)
        }
    }

    fn invoke_repeated(&mut self, repeated: &RepeatedInst) -> Result<(), ExecuteError> {
        let node = self.resolve_section(&repeated.var);
        let len = if node.is_array() { node.size() } else { 0 };
        if len == 0 {
            return self.execute_alternative(&repeated.block.alternative);
        }

        self.push(node.clone());
        for index in 0..len {
            if let Some(frame) = self.frame_mut() {
                frame.set_index(Some(index));
            }
            let element = node.element(index);
            self.push(if element.is_null() { Node::Missing } else { element });
            self.execute_block(&repeated.block.consequent)?;
            // Runs inside the element frame so locals bound by the body
            // are visible.
            if index + 1 < len
                && let Some(alt) = &repeated.alternates_with
            {
                self.check_limit()?;
                self.execute_block(&alt.block.consequent)?;
            }
            self.pop();
        }
        self.pop();
        Ok(())
    }

    // ===================================================================
    // Expressions
    // ===================================================================

    /// Reduce `expr` against the current frame. Returns the result and the
    /// number of problems reported while evaluating.
    fn reduce(&mut self, expr: &Expr) -> (Option<ExprValue>, usize) {
        let mut scope = EvalScope {
            ctx: self,
            raw: expr.raw(),
            failures: 0,
        };
        let result = expr.reduce(&mut scope);
        (result, scope.failures)
    }

    fn invoke_eval(&mut self, eval: &EvalInst) -> Result<(), ExecuteError> {
        let expr = &eval.expr;
        for message in expr.errors() {
            let info = self
                .error(ExecuteErrorType::ExpressionParse)
                .with_name(expr.raw())
                .with_data(message);
            self.add_error(info);
        }
        if eval.debug {
            let debug = expr.debug();
            let buf = self.buffer_mut();
            buf.push_str("EVAL=");
            buf.push_str(&debug);
        }
        if !expr.errors().is_empty() {
            return Ok(());
        }

        // Locals assigned by the expression land in a scratch frame and are
        // only kept when evaluation succeeded.
        let node = self.node();
        self.push(node);
        let (result, failures) = self.reduce(expr);
        let vars = self.pop().and_then(|mut frame| frame.take_vars());
        if failures > 0 {
            return Ok(());
        }
        for (name, value) in vars.into_iter().flatten() {
            self.set_var(name, value);
        }
        if let Some(value) = result {
            if eval.debug {
                self.buffer_mut().push_str(" -> ");
            }
            let node: Node<'a> = value.into();
            node.emit(self.buffer_mut());
        }
        Ok(())
    }

    // ===================================================================
    // Includes
    // ===================================================================

    fn invoke_include(&mut self, include: &IncludeInst) -> Result<(), ExecuteError> {
        if !self.enable_include() {
            return Ok(());
        }
        let code = match self.get_partial(&include.name) {
            Ok(Some(code)) => code,
            Ok(None) => {
                let error = self
                    .error(ExecuteErrorType::IncludePartialMissing)
                    .with_name(&include.name);
                return self.fail(error);
            }
            Err(info) => {
                let error = self
                    .error(ExecuteErrorType::IncludePartialSyntax)
                    .with_name(&include.name)
                    .with_data(info.message())
                    .with_children([info]);
                return Err(ExecuteError::Code(error));
            }
        };

        let saved = (!include.output).then(|| self.swap_buffer(String::new()));
        let result = match self.enter_partial(&include.name) {
            Ok(true) => {
                let result = self.execute_block(code.consequent());
                self.exit_partial(&include.name);
                result
            }
            Ok(false) => Ok(()),
            Err(err) => Err(err),
        };
        if let Some(saved) = saved {
            self.swap_buffer(saved);
        }
        result
    }
}

/// Scalar view of a node for the expression language. Containers have no
/// scalar form.
pub fn expr_value(node: &Node<'_>) -> Option<ExprValue> {
    match node {
        Node::Missing => Some(ExprValue::Null),
        Node::NonFinite(n) => Some(ExprValue::Number(*n)),
        _ => match node.value()? {
            Value::Null => Some(ExprValue::Null),
            Value::Bool(b) => Some(ExprValue::Bool(*b)),
            Value::Number(n) => Some(ExprValue::Number(n.as_f64().unwrap_or(f64::NAN))),
            Value::String(s) => Some(ExprValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        },
    }
}

/// Connects an expression to the context it runs in.
struct EvalScope<'c, 'a> {
    ctx: &'c mut Context<'a>,
    raw: &'c str,
    failures: usize,
}

impl ExprScope for EvalScope<'_, '_> {
    fn lookup(&self, name: &VarName) -> Option<ExprValue> {
        expr_value(&self.ctx.resolve(name))
    }

    fn assign(&mut self, name: &str, value: ExprValue) {
        self.ctx.set_var(name, value.into());
    }

    fn report(&mut self, message: String) {
        self.failures += 1;
        let info: ErrorInfo = self
            .ctx
            .error(ExecuteErrorType::ExpressionReduce)
            .with_name(self.raw)
            .with_data(message);
        self.ctx.add_error(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler};
    use serde_json::json;

    fn execute(template: &str, data: Value) -> (String, Vec<ErrorInfo>) {
        let compiler = Compiler::new();
        let code = compiler
            .compile(template, &CompileOptions::new())
            .unwrap()
            .into_code();
        let mut ctx = Context::new(&compiler, Node::Borrowed(&data)).with_safe_execution(true);
        ctx.run(&code).unwrap();
        let errors = ctx.errors().to_vec();
        (ctx.into_output(), errors)
    }

    #[test]
    fn test_text_and_variables() {
        let (out, _) = execute("Hi {name}! {list} {n}", json!({"name": "Ann", "list": [1, 2], "n": 1.5}));
        assert_eq!(out, "Hi Ann! 1,2 1.5");
    }

    #[test]
    fn test_section_walks_current_frame_only() {
        let data = json!({"a": {"x": 1}, "b": 2});
        let (out, _) = execute("{.section a}{x}{b}{.section b}yes{.or}no{.end}{.end}", data);
        assert_eq!(out, "12no");
    }

    #[test]
    fn test_repeated_index_and_alternates() {
        let data = json!({"items": ["a", "b", "c"]});
        let (out, _) = execute(
            "{.repeated section items}{@index}{@}{.alternates with},{.end}",
            data,
        );
        assert_eq!(out, "1a,2b,3c");
    }

    #[test]
    fn test_repeated_empty_takes_alternative() {
        let (out, _) = execute("{.repeated section items}x{.or}none{.end}", json!({"items": []}));
        assert_eq!(out, "none");
    }

    #[test]
    fn test_if_chain() {
        let data = json!({"a": 1, "b": 0, "c": "x"});
        let (out, _) = execute("{.if a && b}1{.end}{.if b || c}2{.end}{.if b}3{.or}4{.end}", data);
        assert_eq!(out, "24");
    }

    #[test]
    fn test_eval_keeps_locals() {
        let (out, errors) = execute("{.eval @x = n * 2}{.eval @x + 1}{@x}", json!({"n": 4}));
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(out, "98");
    }

    #[test]
    fn test_eval_debug() {
        let (out, _) = execute("{.eval #1 + 2}", json!({}));
        assert_eq!(out, "EVAL=[[1 2 <add>]] -> 3");
    }

    #[test]
    fn test_if_expression() {
        let data = json!({"n": 5});
        let (out, _) = execute("{.if n > 3}big{.or}small{.end}", data);
        assert_eq!(out, "big");
    }

    #[test]
    fn test_bindvar_and_ctx() {
        let data = json!({"a": "x", "b": {"c": 3}});
        let (out, _) = execute("{.var @v a}{.ctx @o k=b.c}{@v}{@o.k}", data);
        assert_eq!(out, "x3");
    }

    #[test]
    fn test_literals_and_meta() {
        let (out, _) = execute("{.meta-left}{.space}{.tab}{.newline}{.meta-right}", json!({}));
        assert_eq!(out, "{ \t\n}");
    }

    #[test]
    fn test_expr_value() {
        assert_eq!(expr_value(&Node::Missing), Some(ExprValue::Null));
        assert_eq!(expr_value(&Node::owned(json!("s"))), Some(ExprValue::Str("s".into())));
        assert_eq!(expr_value(&Node::owned(json!([1]))), None);
    }
}
