//! The handful of PHP constructs the generated autoload files use.

/// A generated `.php` file: an open tag, a header comment, and statements.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub header: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Return(Expr),
    Assign(Expr, Expr),
    If {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key: String,
        value: String,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A single-quoted string literal.
    Str(String),
    Bool(bool),
    Int(i64),
    /// A bare constant such as `PHP_EOL`.
    Const(String),
    /// A variable, without its `$`.
    Var(String),
    /// The `__DIR__` magic constant.
    Dir,
    Concat(Box<Expr>, Box<Expr>),
    /// `array(key => value, ...)`, one entry per line.
    Array(Vec<(Expr, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Isset(Box<Expr>),
    Require(Box<Expr>),
    RequireOnce(Box<Expr>),
    /// A static closure with its parameters and captured variables.
    Closure {
        params: Vec<String>,
        uses: Vec<String>,
        body: Vec<Stmt>,
    },
    /// `(expr)()`.
    Invoke(Box<Expr>),
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// `__DIR__ . '/path'`.
    pub fn dir_path(path: &str) -> Self {
        Expr::Concat(Box::new(Expr::Dir), Box::new(Expr::str(format!("/{path}"))))
    }

    /// `$GLOBALS['name']`.
    pub fn global(name: impl Into<String>) -> Self {
        Expr::var("GLOBALS").index(Expr::str(name))
    }

    pub fn index(self, key: Expr) -> Self {
        Expr::Index(Box::new(self), Box::new(key))
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn isset(self) -> Self {
        Expr::Isset(Box::new(self))
    }

    pub fn require(self) -> Self {
        Expr::Require(Box::new(self))
    }

    pub fn require_once(self) -> Self {
        Expr::RequireOnce(Box::new(self))
    }
}

/// Escapes `value` for a single-quoted PHP string.
pub fn escape_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
