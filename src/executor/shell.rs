//! `sh -c` script rendering
//!
//! Some tools need a credential on their command line. Those runs go
//! through `sh -c` so the secret is expanded from the container
//! environment and never appears in the engine's own argv:
//!
//! ```rust
//! use skopeo_mirror::executor::{ShellArg, ShellScript};
//!
//! let script = ShellScript::new("skopeo")
//!     .arg("copy")
//!     .arg(ShellArg::with_env("robot:", "DST_PASS"))
//!     .render();
//! assert_eq!(script, r#"skopeo copy robot:"${DST_PASS}""#);
//! ```

use std::borrow::Cow;

/// One word of a shell script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellArg {
    /// A literal word, quoted when rendered
    Literal(String),
    /// A literal prefix followed by an expanded variable, e.g. `user:$PASS`
    WithEnv {
        /// Quoted literal part
        prefix: String,
        /// Variable name, expanded by the shell
        var: String,
    },
}

impl ShellArg {
    /// Creates a `prefix$VAR` word
    #[must_use]
    pub fn with_env(prefix: impl Into<String>, var: impl Into<String>) -> Self {
        Self::WithEnv {
            prefix: prefix.into(),
            var: var.into(),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Literal(word) => quote(word).into_owned(),
            Self::WithEnv { prefix, var } if prefix.is_empty() => format!("\"${{{var}}}\""),
            Self::WithEnv { prefix, var } => format!("{}\"${{{var}}}\"", quote(prefix)),
        }
    }
}

impl From<&str> for ShellArg {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for ShellArg {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

/// Builder for a single-command shell script
#[derive(Debug, Clone)]
pub struct ShellScript {
    program: String,
    args: Vec<ShellArg>,
}

impl ShellScript {
    /// Starts a script running `program`
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one word
    #[must_use]
    pub fn arg(mut self, arg: impl Into<ShellArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several literal words
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ShellArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Renders the script text
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(quote(&self.program).into_owned())
            .chain(self.args.iter().map(ShellArg::render))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Renders the `sh -c <script>` exec vector
    #[must_use]
    pub fn into_exec(self) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), self.render()]
    }
}

fn quote(word: &str) -> Cow<'_, str> {
    shell_words::quote(word)
}
