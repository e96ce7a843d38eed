//! Instruction templates for the evaluation strategies.

/// System text for claim decomposition calls.
pub const DECOMPOSE_SYSTEM: &str = "You are a helpful assistant that breaks down insights into \
     verifiable atomic-level claims, and returns a function call to 'decompose_claims'.";

/// System text for claim verification calls.
pub const VERIFY_SYSTEM: &str = "You are a helpful assistant that verifies claims against table \
     data. Return your response by calling the function 'verify_claim' with a JSON object that \
     has exactly one key 'faithfulness' (0 or 1).";

/// System text for direct rubric scoring calls.
pub const SCORE_SYSTEM: &str = "You are a helpful evaluator.";

/// Build the user prompt for decomposing an insight into atomic claims.
pub fn claim_decomposition_prompt(table_schema: &str, insight: &str) -> String {
    format!(
        "Break the insight below into a list of atomic claims. Each claim must be a single \
         factual statement that can be checked against a table with the given schema, without \
         reference to any other claim.\n\n\
         Table schema:\n{table_schema}\n\n\
         Insight:\n{insight}\n\n\
         Return the claims by calling 'decompose_claims'."
    )
}

/// Build the user prompt for verifying one claim against a table.
pub fn claim_verification_prompt(table: &str, claim: &str) -> String {
    format!(
        "Judge whether the claim is faithful to the table. A claim is faithful (1) only if it \
         is fully supported by the table data; otherwise it is not faithful (0).\n\n\
         Table:\n{table}\n\n\
         Claim:\n{claim}"
    )
}

/// Build the G-Eval user prompt for rating an answer's faithfulness.
pub fn faithfulness_prompt(table: &str, question: &str, answer: &str) -> String {
    format!(
        "G-Eval for Evaluating Faithfulness\n\n\
         ### Task Introduction:\n\
         Given a complex question and a generated answer about a table, your task is to rate \
         the answer's Faithfulness.\n\n\
         ### Evaluation Criteria:\n\
         Faithfulness (1-5): A good answer should accurately and completely address the given \
         question. It must be based entirely on the information provided and should not include \
         any unfaithful or hallucinated content.\n\n\
         ### Evaluation Steps:\n\
         1. Thoroughly review both the table and the question, ensuring a full understanding of \
         the information they convey. Identify and analyze key points, critical data, and \
         important details within the table that is relevant to the question.\n\
         2. Carefully examine the proposed answer, focusing on its faithfulness. Check for \
         factual correctness and verify whether the answer reflects and aligns with the \
         information presented in the table.\n\
         3. Evaluate the answer's faithfulness using a strict 1 to 5 rating scale, with 1 being \
         the lowest and 5 the highest.\n\n\
         Table:\n{table}\n\n\
         Question:\n{question}\n\n\
         Answer:\n{answer}\n"
    )
}

/// Build the G-Eval user prompt for rating an answer's comprehensiveness.
pub fn comprehensiveness_prompt(table: &str, question: &str, answer: &str) -> String {
    format!(
        "G-Eval for Evaluating Comprehensiveness\n\n\
         ### Task Introduction:\n\
         Given a complex question and a generated answer about a table, your task is to rate \
         the answer's Comprehensiveness.\n\n\
         ### Evaluation Criteria:\n\
         Comprehensiveness (1-5): A good answer should provide all the necessary information to \
         address the question comprehensively. Additionally, it should avoid including details \
         that, while consistent with the tabular data, are irrelevant to the given question.\n\n\
         ### Evaluation Steps:\n\
         1. Carefully review the table and the question, ensuring you understand the full scope \
         of the information provided. Identify all relevant points and details necessary to \
         answer the question comprehensively.\n\
         2. Analyze the proposed answer to determine if it covers all the key aspects and \
         addresses the question fully. Check whether the answer omits any important information \
         or includes unnecessary details.\n\
         3. Evaluate the answer's comprehensiveness using a 1 to 5 rating scale, where 1 \
         indicates the least comprehensive and 5 indicates the most.\n\n\
         Table:\n{table}\n\n\
         Question:\n{question}\n\n\
         Answer:\n{answer}\n"
    )
}
