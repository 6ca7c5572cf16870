use std::collections::{BTreeSet, HashMap};
use std::fmt;

use graphql_parser::parse_query;
use graphql_parser::query::{
    self as ast, Definition, FragmentDefinition, OperationDefinition, TypeCondition,
};
use serde_json::{Map, Number, Value};

use crate::Operation;
use crate::error::RequestError;
use crate::schema_descriptor::TypeRef;

/// Argument literal, possibly referencing an operation variable.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    pub fn from_ast(value: &ast::Value<'_, String>) -> Self {
        match value {
            ast::Value::Variable(name) => InputValue::Variable(name.clone()),
            ast::Value::Int(number) => InputValue::Int(number.as_i64().unwrap_or_default()),
            ast::Value::Float(float) => InputValue::Float(*float),
            ast::Value::String(string) => InputValue::String(string.clone()),
            ast::Value::Boolean(boolean) => InputValue::Boolean(*boolean),
            ast::Value::Null => InputValue::Null,
            ast::Value::Enum(name) => InputValue::Enum(name.clone()),
            ast::Value::List(items) => InputValue::List(items.iter().map(InputValue::from_ast).collect()),
            ast::Value::Object(fields) => InputValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), InputValue::from_ast(value)))
                    .collect(),
            ),
        }
    }

    /// JSON value of the literal with variables substituted.
    pub fn to_json(&self, variables: &Map<String, Value>) -> Value {
        match self {
            InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            InputValue::Int(int) => Value::Number((*int).into()),
            InputValue::Float(float) => Number::from_f64(*float).map_or(Value::Null, Value::Number),
            InputValue::String(string) | InputValue::Enum(string) => Value::String(string.clone()),
            InputValue::Boolean(boolean) => Value::Bool(*boolean),
            InputValue::Null => Value::Null,
            InputValue::List(items) => {
                Value::Array(items.iter().map(|item| item.to_json(variables)).collect())
            }
            InputValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json(variables)))
                    .collect(),
            ),
        }
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            InputValue::Variable(name) => {
                out.insert(name.clone());
            }
            InputValue::List(items) => items.iter().for_each(|item| item.collect_variables(out)),
            InputValue::Object(fields) => fields
                .iter()
                .for_each(|(_, value)| value.collect_variables(out)),
            _ => {}
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Variable(name) => write!(f, "${name}"),
            InputValue::Int(int) => write!(f, "{int}"),
            InputValue::Float(float) => write!(f, "{float}"),
            InputValue::String(string) => {
                f.write_str(&serde_json::to_string(string).map_err(|_| fmt::Error)?)
            }
            InputValue::Boolean(boolean) => write!(f, "{boolean}"),
            InputValue::Null => f.write_str("null"),
            InputValue::Enum(name) => f.write_str(name),
            InputValue::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            InputValue::Object(fields) => {
                f.write_str("{")?;
                for (index, (name, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub selection_set: SelectionSet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub selection_set: SelectionSet,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<(String, InputValue)>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_selection(mut self, selection_set: SelectionSet) -> Self {
        self.selection_set = selection_set;
        self
    }

    /// Key under which the field appears in a response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Arguments resolved to JSON.
    pub fn argument_values(&self, variables: &Map<String, Value>) -> Map<String, Value> {
        self.arguments
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json(variables)))
            .collect()
    }

    pub fn argument(&self, name: &str, variables: &Map<String, Value>) -> Option<Value> {
        self.arguments
            .iter()
            .find(|(argument, _)| argument == name)
            .map(|(_, value)| value.to_json(variables))
    }
}

impl SelectionSet {
    pub fn new(items: Vec<Selection>) -> Self {
        SelectionSet { items }
    }

    pub fn of_field(field: Field) -> Self {
        SelectionSet::new(vec![Selection::Field(field)])
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parses a bare selection such as `{ author }`.
    pub fn parse(text: &str) -> Result<Self, RequestError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(SelectionSet::default());
        }
        let document =
            parse_query::<String>(trimmed).map_err(|e| RequestError::Parse(e.to_string()))?;
        let lowering = Lowering::new(&document, Map::new());
        match document.definitions.first() {
            Some(Definition::Operation(OperationDefinition::SelectionSet(set))) => {
                lowering.selection_set(set, &mut Vec::new())
            }
            _ => Err(RequestError::Parse(format!(
                "expected a bare selection set, found `{trimmed}`"
            ))),
        }
    }

    /// Top-level fields, ignoring fragments.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.items.iter().filter_map(|item| match item {
            Selection::Field(field) => Some(field),
            Selection::InlineFragment(_) => None,
        })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().any(|field| field.name == name && field.alias.is_none())
    }

    /// Adds selections, merging fields that share a response key and arguments.
    pub fn merge(&mut self, other: SelectionSet) {
        for item in other.items {
            match item {
                Selection::Field(field) => {
                    let existing = self.items.iter_mut().find_map(|existing| match existing {
                        Selection::Field(existing)
                            if existing.response_key() == field.response_key()
                                && existing.name == field.name
                                && existing.arguments == field.arguments =>
                        {
                            Some(existing)
                        }
                        _ => None,
                    });
                    match existing {
                        Some(existing) => existing.selection_set.merge(field.selection_set),
                        None => self.items.push(Selection::Field(field)),
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if !self.items.contains(&Selection::InlineFragment(fragment.clone())) {
                        self.items.push(Selection::InlineFragment(fragment));
                    }
                }
            }
        }
    }

    /// Names of variables referenced anywhere below this set.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        for item in &self.items {
            match item {
                Selection::Field(field) => {
                    for (_, value) in &field.arguments {
                        value.collect_variables(out);
                    }
                    field.selection_set.collect_variables(out);
                }
                Selection::InlineFragment(fragment) => fragment.selection_set.collect_variables(out),
            }
        }
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for item in &self.items {
            match item {
                Selection::Field(field) => write!(f, " {field}")?,
                Selection::InlineFragment(fragment) => {
                    f.write_str(" ...")?;
                    if let Some(condition) = &fragment.type_condition {
                        write!(f, " on {condition}")?;
                    }
                    write!(f, " {}", fragment.selection_set)?;
                }
            }
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("(")?;
            for (index, (name, value)) in self.arguments.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: {value}")?;
            }
            f.write_str(")")?;
        }
        if !self.selection_set.is_empty() {
            write!(f, " {}", self.selection_set)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<InputValue>,
}

/// A rewritten document ready to be sent upstream.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub operation: Operation,
    pub variable_definitions: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

impl Document {
    pub fn query(selection_set: SelectionSet) -> Self {
        Document {
            operation: Operation::Query,
            variable_definitions: Vec::new(),
            selection_set,
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation == Operation::Query && self.variable_definitions.is_empty() {
            return write!(f, "{}", self.selection_set);
        }
        f.write_str(self.operation.keyword())?;
        if !self.variable_definitions.is_empty() {
            f.write_str(" (")?;
            for (index, definition) in self.variable_definitions.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "${}: {}", definition.name, definition.ty)?;
                if let Some(default) = &definition.default_value {
                    write!(f, " = {default}")?;
                }
            }
            f.write_str(")")?;
        }
        write!(f, " {}", self.selection_set)
    }
}

/// Lowers parsed selections into owned trees: fragment spreads are inlined
/// and `@skip`/`@include` are evaluated against the coerced variables.
pub(crate) struct Lowering<'d, 'a> {
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: Map<String, Value>,
}

impl<'d, 'a> Lowering<'d, 'a> {
    pub(crate) fn new(document: &'d ast::Document<'a, String>, variables: Map<String, Value>) -> Self {
        let fragments = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                Definition::Operation(_) => None,
            })
            .collect();
        Lowering {
            fragments,
            variables,
        }
    }

    pub(crate) fn selection_set(
        &self,
        set: &ast::SelectionSet<'a, String>,
        visiting: &mut Vec<String>,
    ) -> Result<SelectionSet, RequestError> {
        let mut items = Vec::with_capacity(set.items.len());
        for selection in &set.items {
            match selection {
                ast::Selection::Field(field) => {
                    if !self.included(&field.directives)? {
                        continue;
                    }
                    items.push(Selection::Field(Field {
                        alias: field.alias.clone(),
                        name: field.name.clone(),
                        arguments: field
                            .arguments
                            .iter()
                            .map(|(name, value)| (name.clone(), InputValue::from_ast(value)))
                            .collect(),
                        selection_set: self.selection_set(&field.selection_set, visiting)?,
                    }));
                }
                ast::Selection::InlineFragment(fragment) => {
                    if !self.included(&fragment.directives)? {
                        continue;
                    }
                    items.push(Selection::InlineFragment(InlineFragment {
                        type_condition: fragment
                            .type_condition
                            .as_ref()
                            .map(|TypeCondition::On(name)| name.clone()),
                        selection_set: self.selection_set(&fragment.selection_set, visiting)?,
                    }));
                }
                ast::Selection::FragmentSpread(spread) => {
                    if !self.included(&spread.directives)? {
                        continue;
                    }
                    let name = spread.fragment_name.as_str();
                    if visiting.iter().any(|visited| visited == name) {
                        return Err(RequestError::Validation(format!(
                            "fragment {name} spreads itself"
                        )));
                    }
                    let fragment = self.fragments.get(name).ok_or_else(|| {
                        RequestError::Validation(format!("unknown fragment {name}"))
                    })?;
                    visiting.push(name.to_string());
                    let selection_set = self.selection_set(&fragment.selection_set, visiting)?;
                    visiting.pop();
                    let TypeCondition::On(type_condition) = &fragment.type_condition;
                    items.push(Selection::InlineFragment(InlineFragment {
                        type_condition: Some(type_condition.clone()),
                        selection_set,
                    }));
                }
            }
        }
        Ok(SelectionSet { items })
    }

    fn included(&self, directives: &[ast::Directive<'a, String>]) -> Result<bool, RequestError> {
        for directive in directives {
            let expected = match directive.name.as_str() {
                "skip" => false,
                "include" => true,
                _ => continue,
            };
            let condition = directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| InputValue::from_ast(value).to_json(&self.variables));
            match condition {
                Some(Value::Bool(value)) if value != expected => return Ok(false),
                Some(Value::Bool(_)) => {}
                _ => {
                    return Err(RequestError::Validation(format!(
                        "@{} requires a boolean `if` argument",
                        directive.name
                    )));
                }
            }
        }
        Ok(true)
    }
}
