//! Extracted handler functions for RPC methods.
//! Each function corresponds to a match arm in `handle_method` and backs
//! one route of the HTTP gateway in front of this service.

use super::*;

use crate::cursor;
use crate::locations::api_locations;
use crate::store::UploadQuery;

// ---------------------------------------------------------------------------
// GROUP 1 -- Position queries
// ---------------------------------------------------------------------------

/// Backs `GET /definitions?path&line&character&uploadId`.
pub(super) fn handle_definitions(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: DefinitionsParams = parse_params(params)?;
    let resolved = engine.definitions(
        deadline,
        params.upload_id,
        &params.path,
        params.line,
        params.character,
    )?;
    Ok(json!({ "locations": api_locations(resolved) }))
}

/// Backs `GET /references?repositoryId&commit&limit&uploadId&path&line&character&cursor`.
pub(super) fn handle_references(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: ReferencesParams = parse_params(params)?;
    let limit = params
        .limit
        .unwrap_or(Config::get().default_page_limit)
        .clamp(1, MAX_PAGE_LIMIT);

    let cursor = params
        .cursor
        .as_deref()
        .map(cursor::decode_cursor)
        .transpose()?;

    let (resolved, next_cursor) = engine.references(
        deadline,
        params.repository_id,
        &params.commit,
        limit,
        params.upload_id,
        &params.path,
        params.line,
        params.character,
        cursor,
    )?;

    let mut body = json!({ "locations": api_locations(resolved) });
    if let Some(next) = next_cursor {
        body["nextCursor"] = json!(cursor::encode_cursor(&next));
    }
    Ok(body)
}

/// Backs `GET /hover?path&line&character&uploadId`. A position without
/// hover text answers `null`, not an error.
pub(super) fn handle_hover(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: HoverParams = parse_params(params)?;
    let hover = engine.hover(
        deadline,
        params.upload_id,
        &params.path,
        params.line,
        params.character,
    )?;
    Ok(match hover {
        Some((text, range)) => json!({ "text": text, "range": range }),
        None => Value::Null,
    })
}

/// Backs `GET /exists?repositoryId&commit&path`.
pub(super) fn handle_exists(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: ExistsParams = parse_params(params)?;
    let dumps = engine.find_closest_dumps(
        deadline,
        params.repository_id,
        &params.commit,
        &params.path,
    )?;
    Ok(json!({ "uploads": dumps }))
}

// ---------------------------------------------------------------------------
// GROUP 2 -- Upload management
// ---------------------------------------------------------------------------

/// Backs `GET /uploads/{id}`.
pub(super) fn handle_get_upload(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: GetUploadParams = parse_params(params)?;
    deadline.check()?;
    let upload = engine
        .store()
        .get_upload_by_id(params.id)?
        .ok_or(Error::MissingDump)?;
    Ok(json!(upload))
}

/// Backs `GET /uploads/repository/{id}`.
pub(super) fn handle_list_uploads(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: ListUploadsParams = parse_params(params)?;
    deadline.check()?;
    let query = UploadQuery {
        term: params.query,
        state: params.state,
        visible_at_tip: params.visible_at_tip,
        limit: params.limit,
        offset: params.offset,
    };
    let (uploads, total_count) = engine.store().list_uploads(params.repository_id, &query)?;
    Ok(json!({ "uploads": uploads, "totalCount": total_count }))
}

/// Backs `DELETE /uploads/{id}`. Deleting a dump that was visible at the
/// tip recomputes the repository's tip-visibility flags from the current
/// tip commit, in the same way the closest-dump query would see them.
pub(super) fn handle_delete_upload(
    engine: &Engine,
    deadline: Deadline,
    params: Value,
) -> std::result::Result<Value, Error> {
    let params: DeleteUploadParams = parse_params(params)?;
    deadline.check()?;
    let (repository_id, was_visible) = engine
        .store()
        .delete_upload(params.id)?
        .ok_or(Error::MissingDump)?;

    if was_visible {
        if let Some(tip_commit) = &params.tip_commit {
            engine
                .store()
                .update_tip_visibility(repository_id, tip_commit)?;
        } else {
            eprintln!(
                "lsifq: Warning: deleted visible dump {} without a tip commit; \
                 tip visibility for repository {} is stale until the next update",
                params.id, repository_id
            );
        }
    }

    Ok(json!({ "id": params.id, "repositoryId": repository_id }))
}
