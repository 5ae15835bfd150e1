//! Parse schema source into message schemas and aliases using PEST.

use crate::bitfield::Bitfield;
use crate::group::CountRule;
use crate::schema::{FieldDescriptor, MessageSchema, SchemaError};
use crate::table::{Direction, MessageKey};
use crate::types::{FixedPoint, Scale, ScalarType};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// One top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Message { direction: Direction, schema: MessageSchema },
    Alias { key: MessageKey, target: MessageKey },
}

/// Parse schema source. Layout checks (bit widths, count references) are left
/// to the table builder, which validates every schema it accepts.
pub fn parse(source: &str) -> Result<Vec<Statement>, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema_file, source).map_err(|e| SchemaError::Parse(e.to_string()))?;
    let file = pairs.into_iter().next().ok_or_else(|| SchemaError::Parse("empty parse".to_string()))?;

    let mut statements = Vec::new();
    for inner in file.into_inner() {
        match inner.as_rule() {
            Rule::message_def => statements.push(build_message(inner)?),
            Rule::alias_def => statements.push(build_alias(inner)?),
            _ => {}
        }
    }
    Ok(statements)
}

fn build_direction(pair: &Pair<Rule>) -> Result<Direction, SchemaError> {
    match pair.as_str() {
        "get" => Ok(Direction::Get),
        "set" => Ok(Direction::Set),
        "poll" => Ok(Direction::Poll),
        other => Err(SchemaError::Parse(format!("unknown direction {other}"))),
    }
}

fn next<'i>(it: &mut impl Iterator<Item = Pair<'i, Rule>>, what: &str) -> Result<Pair<'i, Rule>, SchemaError> {
    it.next().ok_or_else(|| SchemaError::Parse(format!("missing {what}")))
}

/// Inner pairs of a statement without its keyword tokens.
fn statement_parts<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::kw_message | Rule::kw_alias))
}

fn build_message(pair: Pair<Rule>) -> Result<Statement, SchemaError> {
    let mut it = statement_parts(pair);
    let direction = build_direction(&next(&mut it, "direction")?)?;
    let name = next(&mut it, "message name")?.as_str().to_string();
    let fields = build_fields(it, &name, "")?;
    Ok(Statement::Message {
        direction,
        schema: MessageSchema::new(name, fields),
    })
}

fn build_alias(pair: Pair<Rule>) -> Result<Statement, SchemaError> {
    let mut it = statement_parts(pair);
    let direction = build_direction(&next(&mut it, "direction")?)?;
    let name = next(&mut it, "alias name")?.as_str();
    let target_direction = build_direction(&next(&mut it, "target direction")?)?;
    let target = next(&mut it, "target name")?.as_str();
    Ok(Statement::Alias {
        key: MessageKey::new(direction, name),
        target: MessageKey::new(target_direction, target),
    })
}

fn build_fields<'i>(
    pairs: impl Iterator<Item = Pair<'i, Rule>>,
    message: &str,
    prefix: &str,
) -> Result<Vec<FieldDescriptor>, SchemaError> {
    let mut fields = Vec::new();
    for pair in pairs {
        match pair.as_rule() {
            Rule::scalar_field => fields.push(build_scalar(pair, message, prefix)?),
            Rule::bitfield_field => fields.push(build_bitfield(pair, message, prefix)?),
            Rule::group_field => fields.push(build_group(pair, message, prefix)?),
            _ => {}
        }
    }
    Ok(fields)
}

fn build_scalar(pair: Pair<Rule>, message: &str, prefix: &str) -> Result<FieldDescriptor, SchemaError> {
    let mut it = pair.into_inner();
    let name = next(&mut it, "field name")?.as_str().to_string();
    let ty_str = next(&mut it, "field type")?.as_str();
    let invalid = |ty: String| SchemaError::InvalidType {
        message: message.to_string(),
        field: format!("{prefix}{name}"),
        ty,
    };
    let ty = parse_type(ty_str).ok_or_else(|| invalid(ty_str.to_string()))?;
    match it.next() {
        None => Ok(FieldDescriptor::scalar(name.as_str(), ty)),
        Some(scale_pair) => {
            let spelled = format!("{ty_str} * {}", scale_pair.as_str());
            let fp = Scale::parse(scale_pair.as_str())
                .and_then(|scale| FixedPoint::new(ty, scale))
                .ok_or_else(|| invalid(spelled))?;
            Ok(FieldDescriptor::fixed_point(name.as_str(), fp))
        }
    }
}

fn build_bitfield(pair: Pair<Rule>, message: &str, prefix: &str) -> Result<FieldDescriptor, SchemaError> {
    let mut it = pair.into_inner();
    let name = next(&mut it, "field name")?.as_str().to_string();
    let ty_str = next(&mut it, "storage type")?.as_str();
    let storage = parse_type(ty_str).ok_or_else(|| SchemaError::InvalidType {
        message: message.to_string(),
        field: format!("{prefix}{name}"),
        ty: ty_str.to_string(),
    })?;
    let mut members = Vec::new();
    for member in it {
        let mut m = member.into_inner();
        let member_name = next(&mut m, "member name")?.as_str().to_string();
        let width = next(&mut m, "member width")?.as_str();
        let bits: u32 = width
            .parse()
            .map_err(|_| SchemaError::Parse(format!("{message}.{prefix}{member_name}: bad bit width {width}")))?;
        members.push((member_name, bits));
    }
    Ok(FieldDescriptor::bitfield(name, Bitfield::new(storage, members)))
}

fn build_group(pair: Pair<Rule>, message: &str, prefix: &str) -> Result<FieldDescriptor, SchemaError> {
    let mut it = pair.into_inner();
    let name = next(&mut it, "group name")?.as_str().to_string();
    let rule = next(&mut it, "group count")?;
    let rule = next(&mut rule.into_inner(), "group count")?;
    let count = match rule.as_rule() {
        Rule::remainder => CountRule::Remainder,
        Rule::literal_count => CountRule::Fixed(
            rule.as_str()
                .parse()
                .map_err(|_| SchemaError::Parse(format!("{message}.{prefix}{name}: bad count {}", rule.as_str())))?,
        ),
        _ => CountRule::Field(rule.as_str().to_string()),
    };
    let elements = build_fields(it, message, &format!("{prefix}{name}[]."))?;
    Ok(FieldDescriptor::group(name, count, elements))
}

/// Map a type token to its storage type.
///
/// `U`/`X` of width 1, 2, 4 or 8 are unsigned integers and any other width is a
/// byte blob (`U3`, `U40`, `X24`); `C<n>` is always a blob.
pub fn parse_type(token: &str) -> Option<ScalarType> {
    let mut chars = token.chars();
    let letter = chars.next()?;
    let width: usize = chars.as_str().parse().ok()?;
    match letter {
        'U' | 'X' if matches!(width, 1 | 2 | 4 | 8) => ScalarType::unsigned(width),
        'U' | 'X' | 'C' => ScalarType::bytes(width),
        'I' => ScalarType::signed(width),
        'R' => ScalarType::float(width),
        _ => None,
    }
}
