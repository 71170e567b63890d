//! Script templates
//!
//! A subset of Go's text/template syntax, enough for Taskfile scripts:
//!
//! - `{{ .a.b }}` field access on the bound values (`-` is allowed in names)
//! - `$` / `$.a.b` for the root value inside `range`
//! - pipelines (`{{ .x | toJson }}`) and parenthesized calls
//! - `{{ if }}`, `{{ else if }}`, `{{ else }}`, `{{ range }}`, `{{ end }}`
//! - `{{-` and `-}}` whitespace trimming, `{{/* comments */}}`
//!
//! Missing keys are errors, never empty substitutions.

use crate::error::{TemplateError, TemplateResult};
use crate::utils::{cast_keys_to_strings, deep_merge, get_value_at_path, scalar_to_string, split_path};
use serde_json::Value;
use std::fs;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        over: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Commands separated by `|`; each result is passed as the last argument of the next
type Pipeline = Vec<Vec<Operand>>;

#[derive(Debug, Clone)]
enum Operand {
    /// `.a.b`, relative to the current dot
    Dot(Vec<String>),
    /// `$.a.b`, relative to the root value
    Root(Vec<String>),
    Function(String),
    Literal(Value),
    Sub(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot(Vec<String>),
    Root(Vec<String>),
    Ident(String),
    Literal(Value),
    Pipe,
    Open,
    Close,
}

enum Item {
    Text(String),
    Action(Pipeline),
    If(Pipeline),
    Range(Pipeline),
    Else(Option<Pipeline>),
    End,
}

enum Stop {
    Eof,
    End,
    Else(Option<Pipeline>),
}

/// Render `source` against `vars` in one go
pub fn render(name: &str, source: &str, vars: &Value) -> TemplateResult<String> {
    if !source.contains(OPEN) {
        return Ok(source.to_string());
    }
    Template::parse(name, source)?.render(vars)
}

impl Template {
    pub fn parse(name: impl Into<String>, source: &str) -> TemplateResult<Self> {
        let name = name.into();
        let items = split_segments(&name, source)?
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => Ok(Item::Text(text)),
                Segment::Action(body) => parse_item(&name, &body),
            })
            .collect::<TemplateResult<Vec<_>>>()?;

        let mut builder = TreeBuilder {
            name: &name,
            items: items.into_iter(),
        };
        let (nodes, stop) = builder.parse_nodes()?;
        match stop {
            Stop::Eof => Ok(Template { name, nodes }),
            Stop::End => Err(syntax(&name, "unexpected {{end}}")),
            Stop::Else(_) => Err(syntax(&name, "unexpected {{else}}")),
        }
    }

    pub fn render(&self, vars: &Value) -> TemplateResult<String> {
        let eval = Eval {
            name: &self.name,
            root: vars,
        };
        let mut out = String::new();
        eval.exec(&self.nodes, vars, &mut out)?;
        Ok(out)
    }
}

fn syntax(name: &str, reason: impl Into<String>) -> TemplateError {
    TemplateError::InvalidSyntax {
        name: name.to_string(),
        reason: reason.into(),
    }
}

enum Segment {
    Text(String),
    Action(String),
}

/// Split a template into literal text and the bodies of `{{ }}` actions
fn split_segments(name: &str, source: &str) -> TemplateResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(start) = rest.find(OPEN) {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }

        let mut body_start = start + OPEN.len();
        let after = &rest[body_start..];
        if after.starts_with('-') && after[1..].starts_with(char::is_whitespace) {
            text = text.trim_end();
            body_start += 1;
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }

        let end = find_close(&rest[body_start..])
            .ok_or_else(|| syntax(name, "unclosed action"))?;
        let mut body = &rest[body_start..body_start + end];
        trim_next = false;
        if let Some(stripped) = body.strip_suffix('-') {
            if stripped.ends_with(char::is_whitespace) {
                body = stripped;
                trim_next = true;
            }
        }

        let body = body.trim();
        if !(body.starts_with("/*") && body.ends_with("*/")) {
            segments.push(Segment::Action(body.to_string()));
        }
        rest = &rest[body_start + end + CLOSE.len()..];
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(segments)
}

/// Offset of the `}}` closing an action, skipping quoted strings
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn parse_item(name: &str, body: &str) -> TemplateResult<Item> {
    let tokens = tokenize(name, body)?;
    let keyword = match tokens.first() {
        Some(Token::Ident(word)) => word.as_str(),
        Some(_) => return Ok(Item::Action(parse_pipeline(name, &tokens)?)),
        None => return Err(syntax(name, "missing value for command")),
    };

    let rest = &tokens[1..];
    let item = match keyword {
        "if" => Item::If(parse_pipeline(name, rest)?),
        "range" => Item::Range(parse_pipeline(name, rest)?),
        "end" if rest.is_empty() => Item::End,
        "else" if rest.is_empty() => Item::Else(None),
        "else" => match rest.first() {
            Some(Token::Ident(word)) if word == "if" => {
                Item::Else(Some(parse_pipeline(name, &rest[1..])?))
            }
            _ => return Err(syntax(name, "unexpected tokens after else")),
        },
        "end" => return Err(syntax(name, "unexpected tokens after end")),
        "with" | "define" | "template" | "block" => {
            return Err(syntax(name, format!("{{{{{}}}}} is not supported", keyword)))
        }
        _ => Item::Action(parse_pipeline(name, &tokens)?),
    };
    Ok(item)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(name: &str, body: &str) -> TemplateResult<Vec<Token>> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_path = |mut i: usize| -> (Vec<String>, usize) {
        let mut segments = Vec::new();
        while i < chars.len() && chars[i] == '.' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_name_char(chars[end]) {
                end += 1;
            }
            if end == start {
                break;
            }
            segments.push(chars[start..end].iter().collect());
            i = end;
        }
        (segments, i)
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '.' => {
                let (path, next) = read_path(i);
                tokens.push(Token::Dot(path));
                // A lone `.` consumes itself
                i = if next == i { i + 1 } else { next };
            }
            '$' => {
                let (path, next) = read_path(i + 1);
                tokens.push(Token::Root(path));
                i = next;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax(name, "unterminated quoted string")),
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('r') => '\r',
                                Some(other) => *other,
                                None => return Err(syntax(name, "unterminated quoted string")),
                            };
                            value.push(escaped);
                            i += 2;
                        }
                        Some(other) => {
                            value.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(value)));
                i += 1;
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| syntax(name, "unterminated raw quoted string"))?;
                tokens.push(Token::Literal(Value::String(chars[start..end].iter().collect())));
                i = end + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(parse_number(name, &text)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "nil" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(syntax(name, format!("unexpected {:?} in command", other)));
            }
        }
    }
    Ok(tokens)
}

fn parse_number(name: &str, text: &str) -> TemplateResult<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| syntax(name, format!("bad number syntax: {}", text)))
}

fn parse_pipeline(name: &str, tokens: &[Token]) -> TemplateResult<Pipeline> {
    let mut pos = 0;
    let pipeline = pipeline_at(name, tokens, &mut pos)?;
    if pos < tokens.len() {
        return Err(syntax(name, format!("unexpected {:?} in operand", tokens[pos])));
    }
    Ok(pipeline)
}

fn pipeline_at(name: &str, tokens: &[Token], pos: &mut usize) -> TemplateResult<Pipeline> {
    let mut pipeline = Vec::new();
    let mut command = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        match token {
            Token::Pipe => {
                if command.is_empty() {
                    return Err(syntax(name, "missing command before |"));
                }
                pipeline.push(std::mem::take(&mut command));
            }
            Token::Close => {
                *pos -= 1;
                break;
            }
            Token::Open => {
                let sub = pipeline_at(name, tokens, pos)?;
                if tokens.get(*pos) != Some(&Token::Close) {
                    return Err(syntax(name, "unclosed left paren"));
                }
                *pos += 1;
                command.push(Operand::Sub(sub));
            }
            Token::Dot(path) => command.push(Operand::Dot(path.clone())),
            Token::Root(path) => command.push(Operand::Root(path.clone())),
            Token::Ident(function) => command.push(Operand::Function(function.clone())),
            Token::Literal(value) => command.push(Operand::Literal(value.clone())),
        }
    }

    if command.is_empty() {
        return Err(syntax(name, "missing value for command"));
    }
    pipeline.push(command);
    Ok(pipeline)
}

struct TreeBuilder<'t> {
    name: &'t str,
    items: std::vec::IntoIter<Item>,
}

impl TreeBuilder<'_> {
    fn parse_nodes(&mut self) -> TemplateResult<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            match item {
                Item::Text(text) => nodes.push(Node::Text(text)),
                Item::Action(pipeline) => nodes.push(Node::Action(pipeline)),
                Item::If(cond) => nodes.push(self.parse_if(cond)?),
                Item::Range(over) => {
                    let (body, stop) = self.parse_nodes()?;
                    let otherwise = match stop {
                        Stop::End => Vec::new(),
                        Stop::Else(None) => self.parse_until_end()?,
                        Stop::Else(Some(_)) => {
                            return Err(syntax(self.name, "{{else if}} inside range"))
                        }
                        Stop::Eof => return Err(syntax(self.name, "unexpected EOF in range")),
                    };
                    nodes.push(Node::Range {
                        over,
                        body,
                        otherwise,
                    });
                }
                Item::Else(cond) => return Ok((nodes, Stop::Else(cond))),
                Item::End => return Ok((nodes, Stop::End)),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn parse_if(&mut self, cond: Pipeline) -> TemplateResult<Node> {
        let (then, stop) = self.parse_nodes()?;
        let otherwise = match stop {
            Stop::End => Vec::new(),
            Stop::Else(None) => self.parse_until_end()?,
            // `else if` shares the `end` of the enclosing if
            Stop::Else(Some(cond)) => vec![self.parse_if(cond)?],
            Stop::Eof => return Err(syntax(self.name, "unexpected EOF in if")),
        };
        Ok(Node::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_until_end(&mut self) -> TemplateResult<Vec<Node>> {
        match self.parse_nodes()? {
            (nodes, Stop::End) => Ok(nodes),
            (_, Stop::Else(_)) => Err(syntax(self.name, "unexpected {{else}} after {{else}}")),
            (_, Stop::Eof) => Err(syntax(self.name, "unexpected EOF")),
        }
    }
}

struct Eval<'t> {
    name: &'t str,
    root: &'t Value,
}

impl Eval<'_> {
    fn exec(&self, nodes: &[Node], dot: &Value, out: &mut String) -> TemplateResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline, dot)?;
                    out.push_str(&print(&value));
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if truthy(&self.pipeline(cond, dot)?) {
                        self.exec(then, dot, out)?;
                    } else {
                        self.exec(otherwise, dot, out)?;
                    }
                }
                Node::Range {
                    over,
                    body,
                    otherwise,
                } => {
                    let items: Vec<Value> = match self.pipeline(over, dot)? {
                        Value::Array(items) => items,
                        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(syntax(
                                self.name,
                                format!("range can't iterate over {}", other),
                            ))
                        }
                    };
                    if items.is_empty() {
                        self.exec(otherwise, dot, out)?;
                    }
                    for item in &items {
                        self.exec(body, item, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline, dot: &Value) -> TemplateResult<Value> {
        let mut piped = None;
        for command in pipeline {
            piped = Some(self.command(command, dot, piped)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(
        &self,
        words: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> TemplateResult<Value> {
        match words {
            [Operand::Function(function), rest @ ..] => {
                let mut args = rest
                    .iter()
                    .map(|word| self.operand(word, dot))
                    .collect::<TemplateResult<Vec<_>>>()?;
                args.extend(piped);
                self.call(function, args)
            }
            [operand] if piped.is_none() => self.operand(operand, dot),
            _ => Err(syntax(self.name, "can't give argument to non-function")),
        }
    }

    fn operand(&self, operand: &Operand, dot: &Value) -> TemplateResult<Value> {
        match operand {
            Operand::Dot(path) => self.field(dot, path),
            Operand::Root(path) => self.field(self.root, path),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Sub(pipeline) => self.pipeline(pipeline, dot),
            Operand::Function(function) => self.call(function, Vec::new()),
        }
    }

    fn field(&self, base: &Value, path: &[String]) -> TemplateResult<Value> {
        let mut current = base;
        for (depth, segment) in path.iter().enumerate() {
            current = match get_value_at_path(current, &[segment.as_str()]) {
                Ok(Some(value)) => value,
                _ => {
                    return Err(TemplateError::UndefinedVariable {
                        name: self.name.to_string(),
                        key: path[..=depth].join("."),
                    })
                }
            };
        }
        Ok(current.clone())
    }

    fn call(&self, function: &str, args: Vec<Value>) -> TemplateResult<Value> {
        let failed = |reason: String| TemplateError::FunctionFailed {
            name: self.name.to_string(),
            function: function.to_string(),
            reason,
        };
        let arity = |min: usize, max: usize| {
            if args.len() < min || args.len() > max {
                Err(failed(format!("wrong number of args: got {}", args.len())))
            } else {
                Ok(())
            }
        };
        let string_arg = |index: usize| -> TemplateResult<String> {
            scalar_to_string(&args[index])
                .ok_or_else(|| failed(format!("expected a string, got {}", args[index])))
        };

        match function {
            "get" => {
                arity(1, 1)?;
                let path = string_arg(0)?;
                lookup(self.root, &path).ok_or_else(|| failed(format!("key \"{}\" not found", path)))
            }
            "dig" => {
                arity(2, 2)?;
                let path = string_arg(0)?;
                lookup(&args[1], &path).ok_or_else(|| failed(format!("key \"{}\" not found", path)))
            }
            "join" => {
                arity(2, 2)?;
                let sep = string_arg(0)?;
                match &args[1] {
                    Value::Array(items) => Ok(Value::String(
                        join_scalars(items).map_err(failed)?.join(&sep),
                    )),
                    Value::String(s) => Ok(Value::String(s.clone())),
                    other => Err(failed(format!("can't join {}", other))),
                }
            }
            "merge" => {
                arity(1, usize::MAX)?;
                let mut merged = Value::Object(Default::default());
                for arg in args {
                    if !arg.is_object() {
                        return Err(failed(format!("can't merge non-map {}", arg)));
                    }
                    deep_merge(&mut merged, arg);
                }
                Ok(merged)
            }
            "readFile" => {
                arity(1, 1)?;
                let path = string_arg(0)?;
                fs::read_to_string(&path)
                    .map(Value::String)
                    .map_err(|e| failed(format!("{}: {}", path, e)))
            }
            "toJson" => {
                arity(1, 1)?;
                serde_json::to_string(&args[0])
                    .map(Value::String)
                    .map_err(|e| failed(e.to_string()))
            }
            "toYaml" => {
                arity(1, 1)?;
                serde_yaml::to_string(&args[0])
                    .map(|s| Value::String(s.trim_end_matches('\n').to_string()))
                    .map_err(|e| failed(e.to_string()))
            }
            "fromYaml" => {
                arity(1, 1)?;
                let source = string_arg(0)?;
                let parsed: serde_yaml::Value =
                    serde_yaml::from_str(&source).map_err(|e| failed(e.to_string()))?;
                cast_keys_to_strings(parsed).map_err(|e| failed(e.to_string()))
            }
            "toFlags" => {
                arity(1, 1)?;
                to_flags(&args[0]).map(Value::String).map_err(failed)
            }
            "escapeDoubleQuotes" => {
                arity(1, 1)?;
                Ok(Value::String(string_arg(0)?.replace('"', "\\\"")))
            }
            "eq" => {
                arity(2, usize::MAX)?;
                Ok(Value::Bool(args[1..].iter().any(|other| *other == args[0])))
            }
            "ne" => {
                arity(2, 2)?;
                Ok(Value::Bool(args[0] != args[1]))
            }
            "not" => {
                arity(1, 1)?;
                Ok(Value::Bool(!truthy(&args[0])))
            }
            "default" => {
                arity(2, 2)?;
                let mut args = args;
                let given = args.pop().unwrap_or(Value::Null);
                let fallback = args.pop().unwrap_or(Value::Null);
                Ok(if truthy(&given) { given } else { fallback })
            }
            _ => Err(TemplateError::UnknownFunction {
                name: self.name.to_string(),
                function: function.to_string(),
            }),
        }
    }
}

fn lookup(root: &Value, path: &str) -> Option<Value> {
    get_value_at_path(root, &split_path(path))
        .ok()
        .flatten()
        .cloned()
}

fn join_scalars(items: &[Value]) -> Result<Vec<String>, String> {
    items
        .iter()
        .map(|item| scalar_to_string(item).ok_or_else(|| format!("can't join non-scalar {}", item)))
        .collect()
}

/// `--key=value` pairs for every entry of a map; sequences become comma separated
fn to_flags(value: &Value) -> Result<String, String> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(String::new()),
        other => return Err(format!("expected a map, got {}", other)),
    };

    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut flags = Vec::new();
    for (key, value) in entries {
        let rendered = match value {
            Value::Null => continue,
            Value::Array(items) => join_scalars(items)?.join(","),
            Value::Object(_) => return Err(format!("unsupported value for flag {}: {}", key, value)),
            scalar => scalar_to_string(scalar).unwrap_or_default(),
        };
        flags.push(format!("--{}={}", key, rendered));
    }
    Ok(flags.join(" "))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn print(value: &Value) -> String {
    match value {
        Value::Null => "<no value>".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_ok(source: &str, vars: Value) -> String {
        render("test", source, &vars).unwrap()
    }

    #[test]
    fn test_field_access() {
        let vars = json!({"aws": {"region": "us-east-1"}, "step-1": "out"});
        assert_eq!(
            render_ok("region={{ .aws.region }} prev={{.step-1}}", vars),
            "region=us-east-1 prev=out"
        );
    }

    #[test]
    fn test_underscore_matches_hyphen() {
        assert_eq!(render_ok("{{ .foo_bar }}", json!({"foo-bar": 1})), "1");
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = render("app.definition.yaml: script.deploy.script", "{{ .nope }}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref key, .. } if key == "nope"));
        assert!(err.to_string().starts_with("app.definition.yaml: script.deploy.script"));
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render_ok("echo hello", json!({})), "echo hello");
    }

    #[test]
    fn test_pipelines_and_functions() {
        let vars = json!({"msg": "say \"hi\"", "items": ["a", "b", 3]});
        assert_eq!(render_ok("{{ .msg | escapeDoubleQuotes }}", vars.clone()), "say \\\"hi\\\"");
        assert_eq!(render_ok("{{ join \",\" .items }}", vars.clone()), "a,b,3");
        assert_eq!(render_ok("{{ get \"items\" | toJson }}", vars), "[\"a\",\"b\",3]");
    }

    #[test]
    fn test_dig_and_default() {
        let vars = json!({"m": {"a": {"b": "deep"}}, "empty": ""});
        assert_eq!(render_ok("{{ dig \"a.b\" .m }}", vars.clone()), "deep");
        assert_eq!(render_ok("{{ .empty | default \"fallback\" }}", vars), "fallback");
    }

    #[test]
    fn test_merge_rightmost_wins() {
        let vars = json!({"a": {"x": 1, "y": 1}, "b": {"y": 2}});
        assert_eq!(render_ok("{{ merge .a .b | toJson }}", vars), "{\"x\":1,\"y\":2}");
    }

    #[test]
    fn test_to_flags() {
        let vars = json!({"f": {"count": 2, "dry-run": true, "tags": ["x", "y"], "name": "n"}});
        assert_eq!(
            render_ok("cmd {{ toFlags .f }}", vars),
            "cmd --count=2 --dry-run=true --name=n --tags=x,y"
        );
    }

    #[test]
    fn test_yaml_codecs() {
        let vars = json!({"doc": "a: 1\nb: [x]\n"});
        assert_eq!(render_ok("{{ fromYaml .doc | toJson }}", vars), "{\"a\":1,\"b\":[\"x\"]}");
        assert_eq!(render_ok("{{ toYaml .m }}", json!({"m": {"k": "v"}})), "k: v");
    }

    #[test]
    fn test_if_else() {
        let source = "{{ if eq .env \"prod\" }}careful{{ else if .debug }}debug{{ else }}normal{{ end }}";
        assert_eq!(render_ok(source, json!({"env": "prod", "debug": false})), "careful");
        assert_eq!(render_ok(source, json!({"env": "dev", "debug": true})), "debug");
        assert_eq!(render_ok(source, json!({"env": "dev", "debug": false})), "normal");
        assert_eq!(render_ok("{{ if not .x }}no{{ end }}", json!({"x": ""})), "no");
    }

    #[test]
    fn test_range_and_root() {
        let vars = json!({"items": ["a", "b"], "sep": ";"});
        assert_eq!(render_ok("{{ range .items }}{{ . }}{{ $.sep }}{{ end }}", vars), "a;b;");
        assert_eq!(
            render_ok("{{ range .items }}x{{ else }}none{{ end }}", json!({"items": []})),
            "none"
        );
    }

    #[test]
    fn test_trim_markers_and_comments() {
        let source = "a  {{- /* note */ -}}  \n  {{- .v -}}  \n b";
        assert_eq!(render_ok(source, json!({"v": "x"})), "axb");
    }

    #[test]
    fn test_quoted_close_delimiter() {
        assert_eq!(render_ok("{{ \"}}\" }}", json!({})), "}}");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            Template::parse("t", "{{ .a "),
            Err(TemplateError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            Template::parse("t", "{{ if .a }}x"),
            Err(TemplateError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            Template::parse("t", "{{ end }}"),
            Err(TemplateError::InvalidSyntax { .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let err = render("t", "{{ shout .a }}", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction { ref function, .. } if function == "shout"));
    }
}
