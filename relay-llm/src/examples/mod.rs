// Examples module for relay-llm
//
// - basic_query.rs: Simple chat completion
// - query_with_history.rs: Developer instructions and a follow-up turn kept client side
// - streaming_query.rs: Responses API streaming, text deltas printed as they arrive
// - function_calling.rs: get_weather declared, executed locally, result fed back
// - responses_query.rs: previous_response_id chaining and max_output_tokens handling
//
// To run examples:
// cargo run --example basic_query
// cargo run --example query_with_history
// cargo run --example streaming_query
// cargo run --example function_calling
// cargo run --example responses_query

pub mod basic_query;
pub mod query_with_history;
pub mod streaming_query;
pub mod function_calling;
pub mod responses_query;
