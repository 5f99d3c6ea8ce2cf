use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::{SchemaError, StateStoreError};
use crate::schema::{
    canonical_bytes, digest_hex, format_timestamp, now_utc_seconds, parse_utc_timestamp,
    validate, StateBundle,
};

/// Prompt role that accumulates refinement instructions.
pub const DEVELOPER_PROMPT: &str = "developer";

/// Prefix marking user-supplied text inside a refined developer prompt.
pub const USER_TEXT_TAG: &str = "User request:";

/// Derives a new bundle from `prev`, stamped with the current UTC time.
pub fn refine(
    prev: &StateBundle,
    refine_instruction: &str,
    user_text: &str,
) -> Result<StateBundle, StateStoreError> {
    refine_at(prev, refine_instruction, user_text, now_utc_seconds())
}

/// Same as [`refine`] with an explicit clock reading.
///
/// The result links back to `prev` through `prev_sha`, the digest of `prev`'s
/// canonical serialization. Its `created_at` is strictly later than `prev`'s:
/// a colliding or earlier `now` is pushed to one second after `prev`.
pub fn refine_at(
    prev: &StateBundle,
    refine_instruction: &str,
    user_text: &str,
    now: OffsetDateTime,
) -> Result<StateBundle, StateStoreError> {
    validate(prev)?;

    let prev_bytes = canonical_bytes(prev)
        .map_err(|source| StateStoreError::json_serialize("<refinement source>", source))?;

    let mut next = prev.clone();
    next.prev_sha = Some(digest_hex(&prev_bytes));
    next.created_at = format_timestamp(next_created_at(prev, now)?)?;

    let developer = compose_developer_prompt(
        prev.prompts
            .get(DEVELOPER_PROMPT)
            .map(String::as_str)
            .unwrap_or_default(),
        refine_instruction,
        user_text,
    );
    next.prompts.insert(DEVELOPER_PROMPT.to_string(), developer);
    next.refresh_source_hash();

    Ok(next)
}

fn next_created_at(prev: &StateBundle, now: OffsetDateTime) -> Result<OffsetDateTime, SchemaError> {
    let prev_at = parse_utc_timestamp("created_at", &prev.created_at)?;
    let now = now.to_offset(UtcOffset::UTC);
    let now = now.replace_nanosecond(0).unwrap_or(now);
    let prev_floor = prev_at.replace_nanosecond(0).unwrap_or(prev_at);

    if now <= prev_floor {
        Ok(prev_floor + Duration::seconds(1))
    } else {
        Ok(now)
    }
}

/// Joins the non-empty parts with blank lines, in a fixed order.
fn compose_developer_prompt(previous: &str, instruction: &str, user_text: &str) -> String {
    let user_text = user_text.trim();
    let tagged_user = if user_text.is_empty() {
        String::new()
    } else {
        format!("{USER_TEXT_TAG} {user_text}")
    };

    [previous.trim(), instruction.trim(), tagged_user.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
