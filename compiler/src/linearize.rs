//! Flattens a slot tree into a [`Program`].
//!
//! Section order is fixed: declarations are checked first, then variables
//! are initialised, then the assignment, conditional, computed and epilogue
//! sections run, then the return expression is evaluated.

use std::sync::Arc;

use morphstack_schema::{Object, Value, Var};
use sha2::{Digest, Sha256};

use crate::error::{CompileError, OperationError};
use crate::operation::{HashMode, OperationKind};
use crate::runtime::{Body, Cond, Expr, Flow, Frame, Fragment, Program, Stmt};
use crate::slots::{
    paths, AndChain, Block, Conditional, Container, FunctionFactory, Init, Member, Node,
    ObjectLiteral, Ret, SlotId, SlotTree, Template,
};

type RetFn = Box<dyn Fn(&mut Frame) -> Result<Value, OperationError> + Send + Sync>;

enum InitPlan {
    Literal(Expr),
    Move(Var),
}

pub(crate) fn linearize(tree: &SlotTree, kind: OperationKind) -> Result<Program, CompileError> {
    let factory_id = tree.id(&paths::FACTORY).ok_or_else(|| CompileError::MissingSlot {
        path: paths::FACTORY.as_str().to_string(),
    })?;
    let factory = tree.peek::<FunctionFactory>(factory_id)?;

    if let Some(declarations) = factory.declarations() {
        for decl in tree.peek::<Container>(declarations)?.declarations() {
            if !decl.is_attached() {
                return Err(CompileError::DetachedDeclaration {
                    function: decl.name().to_string(),
                });
            }
        }
    }

    let inits = factory
        .variables()
        .iter()
        .map(|(var, init)| {
            let plan = match init {
                Init::Literal(id) => InitPlan::Literal(object_expr(tree, *id)?),
                Init::Move(source) => InitPlan::Move(*source),
            };
            Ok((*var, plan))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let mut stmts = Vec::new();
    for section in factory.sections() {
        section_into(tree, *section, &mut stmts)?;
    }
    let ret = compile_ret(tree, factory.ret(), kind)?;

    tracing::trace!(
        operation = %kind,
        variables = inits.len(),
        statements = stmts.len(),
        "linearized operation"
    );

    let body: Body = Box::new(move |frame| {
        for (var, init) in &inits {
            let value = match init {
                InitPlan::Literal(expr) => expr(frame)?.unwrap_or_default(),
                InitPlan::Move(source) => frame.take(*source),
            };
            frame.bind(*var, value);
        }
        for stmt in &stmts {
            if let Flow::Return(value) = stmt(frame)? {
                return Ok(value);
            }
        }
        ret(frame)
    });

    Ok(Program::new(kind, factory.params().to_vec(), body))
}

fn section_into(tree: &SlotTree, id: SlotId, out: &mut Vec<Stmt>) -> Result<(), CompileError> {
    match tree.peek::<Block>(id) {
        Ok(block) => nodes_into(tree, block.nodes(), out),
        Err(_) => {
            out.push(conditional_stmt(tree, id)?);
            Ok(())
        }
    }
}

fn nodes_into(tree: &SlotTree, nodes: &[Node], out: &mut Vec<Stmt>) -> Result<(), CompileError> {
    for node in nodes {
        match node {
            Node::Stmt(stmt) => out.push(Arc::clone(stmt)),
            Node::Slot(id) => section_into(tree, *id, out)?,
        }
    }
    Ok(())
}

fn conditional_stmt(tree: &SlotTree, id: SlotId) -> Result<Stmt, CompileError> {
    let conditional = tree.peek::<Conditional>(id)?;
    let mut branches: Vec<(Cond, Vec<Stmt>)> = Vec::with_capacity(conditional.branches().len());
    for branch in conditional.branches() {
        let mut body = Vec::new();
        nodes_into(tree, branch.body(), &mut body)?;
        if !body.is_empty() {
            branches.push((Arc::clone(branch.cond()), body));
        }
    }

    Ok(Arc::new(move |frame| {
        for (cond, body) in &branches {
            if !cond(frame)? {
                continue;
            }
            for stmt in body {
                if let Flow::Return(value) = stmt(frame)? {
                    return Ok(Flow::Return(value));
                }
            }
        }
        Ok(Flow::Next)
    }))
}

enum CompiledMember {
    Value {
        name: String,
        value: Expr,
    },
    Nested {
        name: String,
        build: Expr,
        source: Option<morphstack_schema::AccessPath>,
    },
}

fn object_expr(tree: &SlotTree, id: SlotId) -> Result<Expr, CompileError> {
    let literal = tree.peek::<ObjectLiteral>(id)?;
    let members = literal
        .members()
        .iter()
        .map(|member| {
            Ok(match member {
                Member::Property { name, value } => CompiledMember::Value {
                    name: name.clone(),
                    value: Arc::clone(value),
                },
                Member::Nested { name, slot, source } => CompiledMember::Nested {
                    name: name.clone(),
                    build: object_expr(tree, *slot)?,
                    source: source.clone(),
                },
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    Ok(Arc::new(move |frame| {
        let mut object = Object::new();
        for member in &members {
            let (name, value) = match member {
                CompiledMember::Value { name, value } => (name, value(frame)?),
                CompiledMember::Nested {
                    name,
                    build,
                    source: None,
                } => (name, build(frame)?),
                CompiledMember::Nested {
                    name,
                    build,
                    source: Some(source),
                } => match frame.select(source) {
                    Some(Value::Object(_)) => (name, build(frame)?),
                    Some(other) => (name, Some(other.detached())),
                    None => continue,
                },
            };
            if let Some(value) = value {
                object.set(name.as_str(), value)?;
            }
        }
        Ok(Some(Value::Object(object)))
    }))
}

fn template_fragment(tree: &SlotTree, id: SlotId) -> Result<Fragment, CompileError> {
    let template = tree.peek::<Template>(id)?;
    let parts: Vec<Fragment> = template.parts().to_vec();
    let separator = template.separator().to_string();
    Ok(Arc::new(move |frame| {
        let pieces = parts
            .iter()
            .map(|part| part(frame))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pieces.join(&separator))
    }))
}

fn and_cond(tree: &SlotTree, id: SlotId) -> Result<Cond, CompileError> {
    let terms: Vec<Cond> = tree.peek::<AndChain>(id)?.terms().to_vec();
    Ok(Arc::new(move |frame| {
        for term in &terms {
            if !term(frame)? {
                return Ok(false);
            }
        }
        Ok(true)
    }))
}

fn compile_ret(tree: &SlotTree, ret: Option<&Ret>, kind: OperationKind) -> Result<RetFn, CompileError> {
    Ok(match ret {
        None => Box::new(|_| Ok(Value::Null)),
        Some(Ret::Var(var)) => {
            let var = *var;
            Box::new(move |frame| Ok(frame.take(var)))
        }
        Some(Ret::Expr(expr)) => {
            let expr = Arc::clone(expr);
            Box::new(move |frame| Ok(expr(frame)?.unwrap_or_default()))
        }
        Some(Ret::And(id)) => {
            let cond = and_cond(tree, *id)?;
            Box::new(move |frame| Ok(Value::Bool(cond(frame)?)))
        }
        Some(Ret::Hash { ids, object }) => {
            let ids = template_fragment(tree, *ids)?;
            let object = template_fragment(tree, *object)?;
            Box::new(move |frame| {
                let mode = frame
                    .var(Var::Mode)
                    .and_then(HashMode::from_value)
                    .ok_or_else(|| OperationError::InvalidInput {
                        operation: kind,
                        message: "hash mode must be 'ids' or 'object'".to_string(),
                    })?;
                let text = match mode {
                    HashMode::Ids => ids(frame)?,
                    HashMode::Object => object(frame)?,
                };
                Ok(Value::String(digest(&text)))
            })
        }
    })
}

pub(crate) fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
