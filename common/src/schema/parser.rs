//! Parser for LCM type definition (`.lcm`) files

use thiserror::Error;

use super::types::{qualify, Constant, Dimension, FieldType, Member, PrimitiveType, StructDef};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SchemaParseError {
    pub line: usize,
    pub message: String,
}

impl SchemaParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(String),
    Symbol(char),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, SchemaParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                match chars.next() {
                    Some('/') => {
                        for c in chars.by_ref() {
                            if c == '\n' {
                                line += 1;
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        let start = line;
                        let mut prev = '\0';
                        let mut closed = false;
                        for c in chars.by_ref() {
                            if c == '\n' {
                                line += 1;
                            }
                            if prev == '*' && c == '/' {
                                closed = true;
                                break;
                            }
                            prev = c;
                        }
                        if !closed {
                            return Err(SchemaParseError::new(start, "unterminated comment"));
                        }
                    }
                    _ => return Err(SchemaParseError::new(line, "stray '/'")),
                }
            }
            '{' | '}' | '[' | ']' | ';' | ',' | '=' => {
                tokens.push(Spanned {
                    token: Token::Symbol(c),
                    line,
                });
                chars.next();
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Number(text),
                    line,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Ident(text),
                    line,
                });
            }
            other => {
                return Err(SchemaParseError::new(line, format!("unexpected character '{other}'")))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    package: Option<String>,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self) -> Result<Token, SchemaParseError> {
        let line = self.line();
        let token = self
            .tokens
            .get(self.pos)
            .map(|t| t.token.clone())
            .ok_or_else(|| SchemaParseError::new(line, "unexpected end of file"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), SchemaParseError> {
        let line = self.line();
        match self.next()? {
            Token::Symbol(c) if c == symbol => Ok(()),
            other => Err(SchemaParseError::new(
                line,
                format!("expected '{symbol}', found {other:?}"),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<String, SchemaParseError> {
        let line = self.line();
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(SchemaParseError::new(
                line,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_file(&mut self) -> Result<Vec<StructDef>, SchemaParseError> {
        let mut structs = Vec::new();
        while self.peek().is_some() {
            let line = self.line();
            let keyword = self.expect_ident()?;
            match keyword.as_str() {
                "package" => {
                    self.package = Some(self.expect_ident()?);
                    self.expect_symbol(';')?;
                }
                "struct" => structs.push(self.parse_struct()?),
                "enum" => {
                    return Err(SchemaParseError::new(line, "enum definitions are not supported"))
                }
                other => {
                    return Err(SchemaParseError::new(line, format!("unexpected '{other}'")));
                }
            }
        }
        Ok(structs)
    }

    fn parse_struct(&mut self) -> Result<StructDef, SchemaParseError> {
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;

        let mut def = StructDef {
            package: self.package.clone(),
            name,
            members: Vec::new(),
            constants: Vec::new(),
        };

        while !self.eat_symbol('}') {
            let line = self.line();
            let type_name = self.expect_ident()?;
            if type_name == "const" {
                self.parse_constants(&mut def)?;
                continue;
            }

            let ty = match PrimitiveType::from_name(&type_name) {
                Some(primitive) => FieldType::Primitive(primitive),
                None => FieldType::Struct(qualify(self.package.as_deref(), &type_name)),
            };

            loop {
                let member_name = self.expect_ident()?;
                if def.member(&member_name).is_some() {
                    return Err(SchemaParseError::new(
                        line,
                        format!("duplicate member '{member_name}' in {}", def.name),
                    ));
                }
                let dims = self.parse_dimensions(&def)?;
                def.members.push(Member {
                    name: member_name,
                    ty: ty.clone(),
                    dims,
                });
                if !self.eat_symbol(',') {
                    break;
                }
            }
            self.expect_symbol(';')?;
        }

        Ok(def)
    }

    fn parse_dimensions(&mut self, def: &StructDef) -> Result<Vec<Dimension>, SchemaParseError> {
        let mut dims = Vec::new();
        while self.eat_symbol('[') {
            let line = self.line();
            let dim = match self.next()? {
                Token::Number(text) => text.parse::<usize>().map(Dimension::Const).map_err(|_| {
                    SchemaParseError::new(line, format!("invalid array size '{text}'"))
                })?,
                Token::Ident(size_member) => {
                    let sized_by_integer = def.member(&size_member).is_some_and(|m| {
                        m.dims.is_empty()
                            && matches!(m.ty, FieldType::Primitive(p) if p.is_integer())
                    });
                    if !sized_by_integer {
                        return Err(SchemaParseError::new(
                            line,
                            format!("array size '{size_member}' is not an earlier integer member"),
                        ));
                    }
                    Dimension::Var(size_member)
                }
                other => {
                    return Err(SchemaParseError::new(
                        line,
                        format!("expected array size, found {other:?}"),
                    ))
                }
            };
            dims.push(dim);
            self.expect_symbol(']')?;
        }
        Ok(dims)
    }

    fn parse_constants(&mut self, def: &mut StructDef) -> Result<(), SchemaParseError> {
        let line = self.line();
        let type_name = self.expect_ident()?;
        let ty = PrimitiveType::from_name(&type_name).ok_or_else(|| {
            SchemaParseError::new(line, format!("constant of non-primitive type '{type_name}'"))
        })?;

        loop {
            let name = self.expect_ident()?;
            self.expect_symbol('=')?;
            let line = self.line();
            let value = match self.next()? {
                Token::Number(text) | Token::Ident(text) => text,
                other => {
                    return Err(SchemaParseError::new(
                        line,
                        format!("expected constant value, found {other:?}"),
                    ))
                }
            };
            def.constants.push(Constant { name, ty, value });
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(';')
    }
}

/// Parse one `.lcm` source into its struct definitions
pub fn parse_lcm(source: &str) -> Result<Vec<StructDef>, SchemaParseError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
        package: None,
    };
    parser.parse_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_struct_with_arrays_and_comments() {
        let source = r#"
            package mbot_lcm_msgs;

            /* Laser scan
               with variable length arrays */
            struct lidar_t
            {
                int64_t utime;      // microseconds
                int32_t num_ranges;
                float   ranges[num_ranges];
                float   grid[2][num_ranges];
            }
        "#;

        let structs = parse_lcm(source).unwrap();
        assert_eq!(structs.len(), 1);
        let lidar = &structs[0];
        assert_eq!(lidar.full_name(), "mbot_lcm_msgs.lidar_t");
        assert_eq!(lidar.members.len(), 4);
        assert_eq!(lidar.members[2].dims, vec![Dimension::Var("num_ranges".to_string())]);
        assert_eq!(
            lidar.members[3].dims,
            vec![Dimension::Const(2), Dimension::Var("num_ranges".to_string())]
        );
    }

    #[test]
    fn test_parse_constants_and_member_lists() {
        let source = "struct mode_t { const int8_t IDLE = 0, DRIVE = 1; float x, y, theta; }";
        let structs = parse_lcm(source).unwrap();
        let mode = &structs[0];
        assert_eq!(mode.package, None);
        assert_eq!(mode.constants.len(), 2);
        assert_eq!(mode.constants[1].value, "1");
        let names: Vec<_> = mode.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "theta"]);
    }

    #[test]
    fn test_struct_members_are_qualified_with_package() {
        let source = "package pkg; struct outer_t { inner_t a; other.inner_t b; }";
        let structs = parse_lcm(source).unwrap();
        assert_eq!(structs[0].members[0].ty, FieldType::Struct("pkg.inner_t".to_string()));
        assert_eq!(structs[0].members[1].ty, FieldType::Struct("other.inner_t".to_string()));
    }

    #[test]
    fn test_rejects_unknown_size_member() {
        let err = parse_lcm("struct bad_t { float ranges[count]; }").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("count"));
    }

    #[test]
    fn test_rejects_missing_semicolon() {
        let err = parse_lcm("struct bad_t {\n int64_t utime\n }").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_rejects_unterminated_comment() {
        assert!(parse_lcm("/* struct x_t { }").is_err());
    }
}
