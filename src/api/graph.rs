//! A query-only GraphQL subset at `POST /graphql`.
//!
//! Supports anonymous or named queries, variables, aliases and flat
//! selection sets over `getPostcode`, `getPostcodes`, `getNearestPoint`,
//! `getHashes` and `getArea`. Fragments, directives and mutations are not
//! supported.

use super::AppState;
use crate::query::fields::camel_to_snake;
use crate::query::{FieldSet, Shape};
use crate::utils::error::{EtlError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
pub struct GraphRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Name(String),
    Variable(String),
    Str(String),
    Number(f64),
}

fn syntax(message: impl Into<String>) -> EtlError {
    EtlError::InvalidQuery {
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '#' => {
                while chars.next_if(|&c| c != '\n').is_some() {}
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '!' | '=' => {
                tokens.push(Token::Punct(c));
                chars.next();
            }
            '$' => {
                chars.next();
                let mut name = String::new();
                while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    name.push(c);
                }
                if name.is_empty() {
                    return Err(syntax("Expected a variable name after $"));
                }
                tokens.push(Token::Variable(name));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some(escaped) => value.push(escaped),
                            None => return Err(syntax("Unterminated string")),
                        },
                        Some(c) => value.push(c),
                        None => return Err(syntax("Unterminated string")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(c) =
                    chars.next_if(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
                {
                    number.push(c);
                }
                let value = number
                    .parse()
                    .map_err(|_| syntax(format!("Invalid number {}", number)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    name.push(c);
                }
                tokens.push(Token::Name(name));
            }
            other => return Err(syntax(format!("Unexpected character {:?}", other))),
        }
    }
    Ok(tokens)
}

/// One requested field: `alias: name(args) { fields }`.
#[derive(Debug, Clone, PartialEq)]
struct Selection {
    alias: String,
    name: String,
    args: Map<String, Value>,
    fields: Vec<(String, String)>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    variables: &'a Map<String, Value>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: char) -> Result<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(syntax(format!("Expected '{}'", punct)))
        }
    }

    fn name(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Name(name)) => Ok(name),
            other => Err(syntax(format!("Expected a name, found {:?}", other))),
        }
    }

    fn document(&mut self) -> Result<Vec<Selection>> {
        if let Some(Token::Name(keyword)) = self.peek() {
            if keyword != "query" {
                return Err(syntax(format!("Only queries are supported, not {}", keyword)));
            }
            self.pos += 1;
            if matches!(self.peek(), Some(Token::Name(_))) {
                self.pos += 1;
            }
            if self.eat('(') {
                // variable definitions carry no information we need
                let mut depth = 1;
                while depth > 0 {
                    match self.next() {
                        Some(Token::Punct('(')) => depth += 1,
                        Some(Token::Punct(')')) => depth -= 1,
                        Some(_) => {}
                        None => return Err(syntax("Unterminated variable definitions")),
                    }
                }
            }
        }
        self.expect('{')?;
        let mut selections = Vec::new();
        while !self.eat('}') {
            selections.push(self.selection()?);
        }
        if self.peek().is_some() {
            return Err(syntax("Only one operation per request is supported"));
        }
        Ok(selections)
    }

    fn aliased_name(&mut self) -> Result<(String, String)> {
        let first = self.name()?;
        if self.eat(':') {
            let name = self.name()?;
            Ok((first, name))
        } else {
            Ok((first.clone(), first))
        }
    }

    fn selection(&mut self) -> Result<Selection> {
        let (alias, name) = self.aliased_name()?;
        let mut args = Map::new();
        if self.eat('(') {
            while !self.eat(')') {
                let arg = self.name()?;
                self.expect(':')?;
                let value = self.value()?;
                args.insert(arg, value);
            }
        }
        let mut fields = Vec::new();
        if self.eat('{') {
            while !self.eat('}') {
                fields.push(self.aliased_name()?);
                if self.peek() == Some(&Token::Punct('{')) {
                    return Err(syntax("Nested selections are not supported"));
                }
            }
        }
        Ok(Selection {
            alias,
            name,
            args,
            fields,
        })
    }

    fn value(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Number(n)) => Ok(json!(n)),
            Some(Token::Variable(v)) => self
                .variables
                .get(&v)
                .cloned()
                .ok_or_else(|| syntax(format!("Variable ${} is not defined", v))),
            Some(Token::Name(n)) => match n.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => Ok(Value::String(n)),
            },
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.eat(']') {
                    items.push(self.value()?);
                }
                Ok(Value::Array(items))
            }
            other => Err(syntax(format!("Expected a value, found {:?}", other))),
        }
    }
}

fn parse(query: &str, variables: &Map<String, Value>) -> Result<Vec<Selection>> {
    Parser {
        tokens: tokenize(query)?,
        pos: 0,
        variables,
    }
    .document()
}

fn string_arg(selection: &Selection, arg: &str) -> Result<String> {
    match selection.args.get(arg) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(syntax(format!("{} needs a string argument {}", selection.name, arg))),
    }
}

fn float_arg(selection: &Selection, arg: &str) -> Result<f64> {
    selection
        .args
        .get(arg)
        .and_then(Value::as_f64)
        .ok_or_else(|| syntax(format!("{} needs a number argument {}", selection.name, arg)))
}

fn list_arg(selection: &Selection, arg: &str) -> Result<Vec<String>> {
    match selection.args.get(arg) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| syntax(format!("{} must be a list of strings", arg)))
            })
            .collect(),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        _ => Err(syntax(format!("{} needs a list argument {}", selection.name, arg))),
    }
}

/// Re-key a projected result with the names the client asked for.
fn shape_output(selection: &Selection, value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    let out: Map<String, Value> = selection
        .fields
        .iter()
        .map(|(alias, name)| {
            let value = map.remove(&camel_to_snake(name)).unwrap_or(Value::Null);
            (alias.clone(), value)
        })
        .collect();
    Value::Object(out)
}

async fn resolve(state: &AppState, selection: &Selection) -> Result<Value> {
    let shape = match selection.name.as_str() {
        "getNearestPoint" => Shape::NearestPoint,
        "getArea" => Shape::Area,
        _ => Shape::Postcode,
    };
    if selection.fields.is_empty() {
        return Err(syntax(format!("{} needs a selection set", selection.name)));
    }
    let fields = FieldSet::from_names(shape, selection.fields.iter().map(|(_, name)| name))?;
    let service = &state.service;

    let output = |value: Value| shape_output(selection, fields.project(value));
    let value = match selection.name.as_str() {
        "getPostcode" => {
            let postcode = string_arg(selection, "postcode")?;
            output(serde_json::to_value(service.get_postcode(&postcode, &fields).await?)?)
        }
        "getPostcodes" => {
            let postcodes = list_arg(selection, "postcodes")?;
            let results = service.get_postcodes(&postcodes, &fields).await?;
            let items = results
                .into_iter()
                .map(|r| serde_json::to_value(r).map(output))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Value::Array(items)
        }
        "getNearestPoint" => {
            let lat = float_arg(selection, "lat")?;
            let long = float_arg(selection, "long")?;
            output(serde_json::to_value(service.nearest_postcode(lat, long, &fields).await?)?)
        }
        "getHashes" => {
            let hashes = list_arg(selection, "hashes")?;
            let results = service.postcodes_by_hash(&hashes, &fields).await?;
            let items = results
                .into_iter()
                .map(|r| serde_json::to_value(r).map(output))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Value::Array(items)
        }
        "getArea" => {
            let code = string_arg(selection, "areacode")?;
            output(serde_json::to_value(service.get_area(&code).await?)?)
        }
        other => return Err(syntax(format!("Unknown field {}", other))),
    };
    Ok(value)
}

/// POST /graphql
pub async fn graphql(State(state): State<AppState>, Json(request): Json<GraphRequest>) -> Response {
    let variables = request.variables.unwrap_or_default();
    let selections = match parse(&request.query, &variables) {
        Ok(selections) => selections,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "errors": [{ "message": e.to_string() }] })),
            )
                .into_response()
        }
    };

    let mut data = Map::new();
    let mut errors = Vec::new();
    for selection in &selections {
        let value = match resolve(&state, selection).await {
            Ok(value) => value,
            Err(EtlError::RecordNotFound { .. } | EtlError::InvalidPostcode { .. }) => Value::Null,
            Err(e) => {
                errors.push(json!({ "message": e.to_string(), "path": [selection.alias] }));
                Value::Null
            }
        };
        data.insert(selection.alias.clone(), value);
    }

    let mut body = json!({ "data": data });
    if !errors.is_empty() {
        body["errors"] = Value::Array(errors);
    }
    Json(body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_anonymous_query() {
        let selections = parse(
            r#"{ getPostcode(postcode: "SW1A 1AA") { pcds lauaName } }"#,
            &Map::new(),
        )
        .unwrap();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].name, "getPostcode");
        assert_eq!(selections[0].args["postcode"], "SW1A 1AA");
        assert_eq!(
            selections[0].fields,
            vec![
                ("pcds".to_string(), "pcds".to_string()),
                ("lauaName".to_string(), "lauaName".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_named_query_with_variables() {
        let mut variables = Map::new();
        variables.insert("lat".into(), json!(51.5));
        let selections = parse(
            "query Nearest($lat: Float!) {\n  point: getNearestPoint(lat: $lat, long: -0.14) { pcds distance: distanceFromPostcode }\n  getPostcodes(postcodes: [\"SW1A 1AA\", \"W1A 1AA\"]) { pcds }\n}",
            &variables,
        )
        .unwrap();
        assert_eq!(selections[0].alias, "point");
        assert_eq!(selections[0].args["lat"], json!(51.5));
        assert_eq!(selections[0].args["long"], json!(-0.14));
        assert_eq!(
            selections[0].fields[1],
            ("distance".to_string(), "distanceFromPostcode".to_string())
        );
        assert_eq!(selections[1].args["postcodes"], json!(["SW1A 1AA", "W1A 1AA"]));
    }

    #[test]
    fn test_parse_errors() {
        let empty = Map::new();
        assert!(parse("mutation { x }", &empty).is_err());
        assert!(parse("{ getPostcode(postcode: $missing) { pcds } }", &empty).is_err());
        assert!(parse("{ getPostcode(postcode: \"x\") { location { lat } } }", &empty).is_err());
        assert!(parse("{ getPostcode", &empty).is_err());
    }

    #[test]
    fn test_shape_output_uses_aliases() {
        let selection = Selection {
            alias: "getPostcode".into(),
            name: "getPostcode".into(),
            args: Map::new(),
            fields: vec![
                ("pcds".into(), "pcds".into()),
                ("council".into(), "lauaName".into()),
            ],
        };
        let value = shape_output(&selection, json!({"pcds": "SW1A 1AA", "laua_name": "Westminster", "ward": "x"}));
        assert_eq!(value, json!({"pcds": "SW1A 1AA", "council": "Westminster"}));
    }
}
