//! Code generation.

use pretty::RcDoc;

pub mod php;

/// The width generated files are laid out for.
pub const WIDTH: usize = 100;

const INDENT: isize = 4;

pub trait ToDoc {
    fn to_doc(self) -> RcDoc<'static, ()>;
}

/// Renders `file` as PHP source, with a trailing newline.
pub fn render(file: php::File) -> String {
    format!("{}", file.to_doc().pretty(WIDTH))
}

fn block(body: Vec<php::Stmt>) -> RcDoc<'static, ()> {
    let stmts = body.into_iter().map(ToDoc::to_doc);

    RcDoc::text("{")
        .append(
            RcDoc::hardline()
                .append(RcDoc::intersperse(stmts, RcDoc::hardline()))
                .nest(INDENT),
        )
        .append(RcDoc::hardline())
        .append(RcDoc::text("}"))
}

impl ToDoc for php::File {
    fn to_doc(self) -> RcDoc<'static, ()> {
        let stmts = self.body.into_iter().map(ToDoc::to_doc);

        RcDoc::text("<?php")
            .append(RcDoc::hardline())
            .append(RcDoc::hardline())
            .append(RcDoc::text("// "))
            .append(RcDoc::as_string(self.header))
            .append(RcDoc::hardline())
            .append(RcDoc::hardline())
            .append(RcDoc::intersperse(stmts, RcDoc::hardline()))
            .append(RcDoc::hardline())
    }
}

impl ToDoc for php::Stmt {
    fn to_doc(self) -> RcDoc<'static, ()> {
        use php::Stmt;

        match self {
            Stmt::Expr(expr) => expr.to_doc().append(RcDoc::text(";")),
            Stmt::Return(expr) => RcDoc::text("return ")
                .append(expr.to_doc())
                .append(RcDoc::text(";")),
            Stmt::Assign(place, value) => place
                .to_doc()
                .append(RcDoc::text(" = "))
                .append(value.to_doc())
                .append(RcDoc::text(";")),
            Stmt::If { cond, body } => RcDoc::text("if (")
                .append(cond.to_doc())
                .append(RcDoc::text(") "))
                .append(block(body)),
            Stmt::Foreach {
                subject,
                key,
                value,
                body,
            } => RcDoc::text("foreach (")
                .append(subject.to_doc())
                .append(RcDoc::as_string(format!(" as ${key} => ${value}) ")))
                .append(block(body)),
        }
    }
}

impl ToDoc for php::Expr {
    fn to_doc(self) -> RcDoc<'static, ()> {
        use php::Expr;

        match self {
            Expr::Str(value) => RcDoc::as_string(format!(
                "'{}'",
                php::escape_single_quoted(&value)
            )),
            Expr::Bool(true) => RcDoc::text("true"),
            Expr::Bool(false) => RcDoc::text("false"),
            Expr::Int(value) => RcDoc::as_string(value),
            Expr::Const(name) => RcDoc::as_string(name),
            Expr::Var(name) => RcDoc::as_string(format!("${name}")),
            Expr::Dir => RcDoc::text("__DIR__"),
            Expr::Concat(lhs, rhs) => lhs
                .to_doc()
                .append(RcDoc::text(" . "))
                .append(rhs.to_doc()),
            Expr::Array(entries) if entries.is_empty() => RcDoc::text("array()"),
            Expr::Array(entries) => {
                let entries = entries.into_iter().map(|(key, value)| {
                    key.to_doc()
                        .append(RcDoc::text(" => "))
                        .append(value.to_doc())
                        .append(RcDoc::text(","))
                });

                RcDoc::text("array(")
                    .append(
                        RcDoc::hardline()
                            .append(RcDoc::intersperse(entries, RcDoc::hardline()))
                            .nest(INDENT),
                    )
                    .append(RcDoc::hardline())
                    .append(RcDoc::text(")"))
            }
            Expr::Index(subject, key) => subject
                .to_doc()
                .append(RcDoc::text("["))
                .append(key.to_doc())
                .append(RcDoc::text("]")),
            Expr::Call(function, args) => {
                let args = args.into_iter().map(ToDoc::to_doc);
                RcDoc::as_string(function)
                    .append(RcDoc::text("("))
                    .append(RcDoc::intersperse(args, RcDoc::text(", ")))
                    .append(RcDoc::text(")"))
            }
            Expr::Not(expr) => RcDoc::text("!").append(expr.to_doc()),
            Expr::Isset(expr) => RcDoc::text("isset(")
                .append(expr.to_doc())
                .append(RcDoc::text(")")),
            Expr::Require(expr) => RcDoc::text("require ").append(expr.to_doc()),
            Expr::RequireOnce(expr) => RcDoc::text("require_once ").append(expr.to_doc()),
            Expr::Closure { params, uses, body } => {
                let variables = |names: Vec<String>| {
                    let names = names.into_iter().map(|name| format!("${name}"));
                    RcDoc::intersperse(names.map(RcDoc::as_string), RcDoc::text(", "))
                };

                let mut doc = RcDoc::text("static function (")
                    .append(variables(params))
                    .append(RcDoc::text(")"));

                if !uses.is_empty() {
                    doc = doc
                        .append(RcDoc::text(" use ("))
                        .append(variables(uses))
                        .append(RcDoc::text(")"));
                }

                doc.append(RcDoc::space()).append(block(body))
            }
            Expr::Invoke(expr) => RcDoc::text("(")
                .append(expr.to_doc())
                .append(RcDoc::text(")()")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::php::{Expr, File, Stmt};
    use super::*;

    fn file(body: Vec<Stmt>) -> File {
        File {
            header: "generated".into(),
            body,
        }
    }

    #[test]
    fn arrays_render_one_entry_per_line() {
        let array = Expr::Array(vec![
            (Expr::str("A\\B"), Expr::dir_path("a/b.php")),
            (Expr::str("it's"), Expr::Bool(true)),
        ]);

        assert_eq!(
            render(file(vec![Stmt::Return(array)])),
            "<?php\n\n// generated\n\nreturn array(\n    'A\\\\B' => __DIR__ . '/a/b.php',\n    \
             'it\\'s' => true,\n);\n"
        );
        assert_eq!(
            render(file(vec![Stmt::Return(Expr::Array(Vec::new()))])),
            "<?php\n\n// generated\n\nreturn array();\n"
        );
    }

    #[test]
    fn nested_blocks_indent() {
        let closure = Expr::Closure {
            params: vec!["class".into()],
            uses: vec!["map".into()],
            body: vec![Stmt::If {
                cond: Expr::var("map").index(Expr::var("class")).isset(),
                body: vec![Stmt::Expr(
                    Expr::var("map").index(Expr::var("class")).require(),
                )],
            }],
        };
        let call = Expr::Call("spl_autoload_register".into(), vec![closure]);

        assert_eq!(
            render(file(vec![Stmt::Expr(call)])),
            "<?php\n\n// generated\n\nspl_autoload_register(static function ($class) use ($map) {\n    \
             if (isset($map[$class])) {\n        require $map[$class];\n    }\n});\n"
        );
    }

    #[test]
    fn loops_and_globals() {
        let body = vec![Stmt::Assign(
            Expr::global("__p_files").index(Expr::var("id")),
            Expr::Bool(true),
        )];
        let foreach = Stmt::Foreach {
            subject: Expr::var("files"),
            key: "id".into(),
            value: "file".into(),
            body,
        };

        assert_eq!(
            render(file(vec![foreach])),
            "<?php\n\n// generated\n\nforeach ($files as $id => $file) {\n    \
             $GLOBALS['__p_files'][$id] = true;\n}\n"
        );
    }
}
