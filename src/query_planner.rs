use graphql_parser::parse_query;
use graphql_parser::query::{self as ast, Definition, OperationDefinition};
use serde_json::{Map, Value};

use crate::Operation;
use crate::error::RequestError;
use crate::schema_descriptor::TypeRef;
use crate::schema_merger::MergedSchema;
use crate::selection::{Field, InputValue, Lowering, Selection, SelectionSet, VariableDefinition};

#[derive(Clone, Debug, PartialEq)]
pub enum PlanStep {
    /// Root `__typename`.
    Typename { response_key: String },
    /// `__schema` or `__type`, answered from the merged schema.
    Introspection { field: Field },
    /// A root field answered by a subgraph.
    Delegate { field: Field },
}

impl PlanStep {
    pub fn response_key(&self) -> &str {
        match self {
            PlanStep::Typename { response_key } => response_key,
            PlanStep::Introspection { field } | PlanStep::Delegate { field } => field.response_key(),
        }
    }
}

/// Root-level plan of one client operation.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub operation: Operation,
    pub variable_definitions: Vec<VariableDefinition>,
    /// Coerced variables, defaults applied.
    pub variables: Map<String, Value>,
    pub steps: Vec<PlanStep>,
}

pub struct QueryPlanner<'a> {
    schema: &'a MergedSchema,
}

struct SelectedOperation<'d, 'a> {
    operation: Operation,
    variable_definitions: &'d [ast::VariableDefinition<'a, String>],
    selection_set: &'d ast::SelectionSet<'a, String>,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(schema: &'a MergedSchema) -> Self {
        QueryPlanner { schema }
    }

    pub fn plan(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: Option<&Value>,
    ) -> Result<QueryPlan, RequestError> {
        let document = parse_query::<String>(query).map_err(|e| RequestError::Parse(e.to_string()))?;
        let selected = select_operation(&document, operation_name)?;

        let root_type = self
            .schema
            .descriptor()
            .root_type_name(selected.operation)
            .ok_or_else(|| {
                RequestError::Validation(format!(
                    "schema does not support {} operations",
                    selected.operation.keyword()
                ))
            })?
            .to_string();

        let variable_definitions: Vec<VariableDefinition> = selected
            .variable_definitions
            .iter()
            .map(|definition| VariableDefinition {
                name: definition.name.clone(),
                ty: TypeRef::from_ast(&definition.var_type),
                default_value: definition.default_value.as_ref().map(InputValue::from_ast),
            })
            .collect();
        let variables = coerce_variables(&variable_definitions, variables)?;

        let lowering = Lowering::new(&document, variables.clone());
        let lowered = lowering.selection_set(selected.selection_set, &mut Vec::new())?;
        let mut root = SelectionSet::default();
        flatten_root(&root_type, lowered, &mut root)?;

        let mut steps = Vec::with_capacity(root.items.len());
        for item in root.items {
            let Selection::Field(field) = item else {
                continue;
            };
            let step = match field.name.as_str() {
                "__typename" => PlanStep::Typename {
                    response_key: field.response_key().to_string(),
                },
                "__schema" | "__type" if selected.operation == Operation::Query => {
                    PlanStep::Introspection { field }
                }
                name if self.schema.delegation(selected.operation, name).is_some() => {
                    PlanStep::Delegate { field }
                }
                name => {
                    return Err(RequestError::Validation(format!(
                        "Cannot query field \"{name}\" on type \"{root_type}\"."
                    )));
                }
            };
            steps.push(step);
        }

        tracing::debug!(operation = %selected.operation, steps = steps.len(), "query planned");
        Ok(QueryPlan {
            operation: selected.operation,
            variable_definitions,
            variables,
            steps,
        })
    }
}

fn select_operation<'d, 'a>(
    document: &'d ast::Document<'a, String>,
    operation_name: Option<&str>,
) -> Result<SelectedOperation<'d, 'a>, RequestError> {
    let operations: Vec<(Option<&str>, SelectedOperation<'d, 'a>)> = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            Definition::Fragment(_) => None,
        })
        .map(|operation| match operation {
            OperationDefinition::SelectionSet(set) => (
                None,
                SelectedOperation {
                    operation: Operation::Query,
                    variable_definitions: &[],
                    selection_set: set,
                },
            ),
            OperationDefinition::Query(query) => (
                query.name.as_deref(),
                SelectedOperation {
                    operation: Operation::Query,
                    variable_definitions: &query.variable_definitions,
                    selection_set: &query.selection_set,
                },
            ),
            OperationDefinition::Mutation(mutation) => (
                mutation.name.as_deref(),
                SelectedOperation {
                    operation: Operation::Mutation,
                    variable_definitions: &mutation.variable_definitions,
                    selection_set: &mutation.selection_set,
                },
            ),
            OperationDefinition::Subscription(subscription) => (
                subscription.name.as_deref(),
                SelectedOperation {
                    operation: Operation::Subscription,
                    variable_definitions: &subscription.variable_definitions,
                    selection_set: &subscription.selection_set,
                },
            ),
        })
        .collect();

    let selected = match operation_name {
        Some(wanted) => operations
            .into_iter()
            .find(|(name, _)| *name == Some(wanted))
            .map(|(_, operation)| operation)
            .ok_or_else(|| RequestError::Validation(format!("Unknown operation named \"{wanted}\".")))?,
        None => {
            let mut operations = operations.into_iter();
            match (operations.next(), operations.next()) {
                (Some((_, operation)), None) => operation,
                (None, _) => return Err(RequestError::Validation("document contains no operation".to_string())),
                (Some(_), Some(_)) => {
                    return Err(RequestError::Validation(
                        "Must provide operation name if query contains multiple operations.".to_string(),
                    ));
                }
            }
        }
    };

    if selected.operation == Operation::Subscription {
        return Err(RequestError::Validation("subscriptions are not supported".to_string()));
    }
    Ok(selected)
}

fn coerce_variables(
    definitions: &[VariableDefinition],
    provided: Option<&Value>,
) -> Result<Map<String, Value>, RequestError> {
    let provided = match provided {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(object)) => object.clone(),
        Some(_) => return Err(RequestError::Variables("variables must be an object".to_string())),
    };

    let mut coerced = Map::new();
    for definition in definitions {
        let value = match provided.get(&definition.name) {
            Some(value) => value.clone(),
            None => match &definition.default_value {
                Some(default) => default.to_json(&Map::new()),
                None if definition.ty.is_non_null() => {
                    return Err(RequestError::Variables(format!(
                        "Variable \"${}\" of required type \"{}\" was not provided.",
                        definition.name, definition.ty
                    )));
                }
                None => continue,
            },
        };
        if value.is_null() && definition.ty.is_non_null() {
            return Err(RequestError::Variables(format!(
                "Variable \"${}\" of non-null type \"{}\" must not be null.",
                definition.name, definition.ty
            )));
        }
        coerced.insert(definition.name.clone(), value);
    }
    Ok(coerced)
}

/// Hoists root-level fragments so every root item is a field.
fn flatten_root(root_type: &str, selection: SelectionSet, out: &mut SelectionSet) -> Result<(), RequestError> {
    for item in selection.items {
        match item {
            Selection::Field(field) => out.merge(SelectionSet::of_field(field)),
            Selection::InlineFragment(fragment) => match fragment.type_condition.as_deref() {
                None => flatten_root(root_type, fragment.selection_set, out)?,
                Some(condition) if condition == root_type => {
                    flatten_root(root_type, fragment.selection_set, out)?
                }
                Some(condition) => {
                    return Err(RequestError::Validation(format!(
                        "Fragment cannot be spread here as objects of type \"{root_type}\" can never be of type \"{condition}\"."
                    )));
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_executor::{LocalQueryExecutor, QueryExecutor, UpstreamResponse};
    use crate::schema_descriptor::SchemaDescriptor;
    use crate::schema_merger::{SchemaMerger, SubschemaBinding};
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> MergedSchema {
        let executor: Arc<dyn QueryExecutor> = Arc::new(LocalQueryExecutor::new(|_, _, _| {
            async { Ok(UpstreamResponse::data(Value::Null)) }.boxed()
        }));
        let descriptor = SchemaDescriptor::parse(
            "type Query { item(id: ID!): Item items(first: Int): [Item] } type Mutation { like(id: ID!): Item } type Item { id: ID! name: String }",
            "items",
        )
        .unwrap();
        let binding = SubschemaBinding::build("items", descriptor, &[], executor, false).unwrap();
        SchemaMerger::new().add_binding(binding).merge().unwrap()
    }

    #[test]
    fn plans_root_steps_in_order() {
        let schema = schema();
        let plan = QueryPlanner::new(&schema)
            .plan(
                r#"
                query Items($first: Int = 5) {
                  __typename
                  one: item(id: "1") { ...ItemFields }
                  items(first: $first) { id }
                  __schema { queryType { name } }
                }
                fragment ItemFields on Item { id name }
                "#,
                None,
                None,
            )
            .unwrap();

        assert_eq!(plan.operation, Operation::Query);
        assert_eq!(plan.variables, json!({ "first": 5 }).as_object().cloned().unwrap());
        let keys: Vec<&str> = plan.steps.iter().map(PlanStep::response_key).collect();
        assert_eq!(keys, vec!["__typename", "one", "items", "__schema"]);
        assert!(matches!(&plan.steps[3], PlanStep::Introspection { .. }));
        match &plan.steps[1] {
            PlanStep::Delegate { field } => {
                assert_eq!(field.to_string(), r#"one: item(id: "1") { ... on Item { id name } }"#)
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn selects_operations_by_name() {
        let schema = schema();
        let planner = QueryPlanner::new(&schema);
        let document = r#"query A { item(id: "1") { id } } mutation B { like(id: "1") { id } }"#;

        let plan = planner.plan(document, Some("B"), None).unwrap();
        assert_eq!(plan.operation, Operation::Mutation);

        let error = planner.plan(document, None, None).unwrap_err();
        assert!(matches!(error, RequestError::Validation(_)));
        let error = planner.plan(document, Some("C"), None).unwrap_err();
        assert!(matches!(error, RequestError::Validation(_)));
    }

    #[test]
    fn rejects_missing_required_variables() {
        let schema = schema();
        let planner = QueryPlanner::new(&schema);
        let query = "query ($id: ID!) { item(id: $id) { id } }";

        let error = planner.plan(query, None, Some(&json!({}))).unwrap_err();
        assert_eq!(error.code(), "BAD_USER_INPUT");
        let error = planner.plan(query, None, Some(&json!({ "id": null }))).unwrap_err();
        assert!(matches!(error, RequestError::Variables(_)));
        assert!(planner.plan(query, None, Some(&json!({ "id": "1" }))).is_ok());
    }

    #[test]
    fn rejects_unknown_root_fields_and_bad_syntax() {
        let schema = schema();
        let planner = QueryPlanner::new(&schema);
        let error = planner.plan("{ missing }", None, None).unwrap_err();
        assert_eq!(error.to_string(), "Cannot query field \"missing\" on type \"Query\".");
        let error = planner.plan("{ item(id: ", None, None).unwrap_err();
        assert_eq!(error.code(), "GRAPHQL_PARSE_FAILED");
        let error = planner.plan("subscription { item(id: 1) { id } }", None, None).unwrap_err();
        assert!(matches!(error, RequestError::Validation(_)));
    }

    #[test]
    fn ignores_subscriptions_that_are_not_selected() {
        let schema = schema();
        let planner = QueryPlanner::new(&schema);
        let document = r#"query Item { item(id: "1") { id } } subscription Live { item(id: "1") { id } }"#;

        let plan = planner.plan(document, Some("Item"), None).unwrap();
        assert_eq!(plan.operation, Operation::Query);
        assert_eq!(plan.steps.len(), 1);

        let error = planner.plan(document, Some("Live"), None).unwrap_err();
        assert_eq!(error.to_string(), "subscriptions are not supported");
    }
}
