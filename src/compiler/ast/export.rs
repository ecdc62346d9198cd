//! Public-interface enumeration of a module.
use super::*;

/// Calls `on_func`/`on_struct` for every `[export]` function and struct
/// declared at module scope. Function bodies are never entered.
pub fn export<'a, F, S>(module: &'a Module, mut on_func: F, mut on_struct: S)
where
    F: FnMut(&'a FunctionDecl),
    S: FnMut(&'a StructDecl),
{
    for stmt in &module.statements {
        visit(stmt, &mut on_func, &mut on_struct);
    }
}

fn visit<'a, F, S>(stmt: &'a Statement, on_func: &mut F, on_struct: &mut S)
where
    F: FnMut(&'a FunctionDecl),
    S: FnMut(&'a StructDecl),
{
    match &stmt.kind {
        StatementKind::DeclareFunction(func) if func.export => on_func(func),
        StatementKind::DeclareStruct(decl) if decl.export => on_struct(decl),
        StatementKind::Multi(stmts) => {
            for stmt in stmts {
                visit(stmt, on_func, on_struct);
            }
        }
        StatementKind::Conditional(cond) => visit(&cond.statement, on_func, on_struct),
        _ => {}
    }
}

/// Names of exported declarations in declaration order.
pub fn exported_names(module: &Module) -> Vec<String> {
    let names = std::cell::RefCell::new(Vec::new());
    export(
        module,
        |x| names.borrow_mut().push(x.name.clone()),
        |x| names.borrow_mut().push(x.name.clone()),
    );
    names.into_inner()
}

/// Interface-only copy of `module`: its metadata plus exported structs and
/// function signatures with empty bodies.
pub fn interface_of(module: &Module) -> Module {
    let statements = std::cell::RefCell::new(Vec::new());
    export(
        module,
        |func| {
            let decl = FunctionDecl {
                body: Vec::new(),
                ..func.clone()
            };
            statements
                .borrow_mut()
                .push(Statement::new(StatementKind::DeclareFunction(decl), Span::call_site()));
        },
        |decl| {
            statements
                .borrow_mut()
                .push(Statement::new(StatementKind::DeclareStruct(decl.clone()), Span::call_site()));
        },
    );
    Module {
        metadata: module.metadata.clone(),
        imports: Vec::new(),
        imported_modules: Vec::new(),
        statements: statements.into_inner(),
    }
}
