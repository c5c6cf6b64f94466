//! The execution harness: runs operations under a binding with retry, builds cursors, and
//! composes the multi-command chains of collection management.

use std::{sync::Arc, time::Instant};

use crate::{
    bson::doc,
    change_stream::{ChangeStream, ChangeStreamData, ChangeStreamTarget, WatchArgs},
    change_stream::event::ChangeStreamEvent,
    change_stream::options::ChangeStreamOptions,
    conn::{next_request_id, Binding, Connection, ConnectionSource, PinnedConnectionHandle},
    context::OperationContext,
    cursor::{CommandBatchCursor, CursorSpecification},
    error::{Error, ErrorKind, Result, NO_WRITES_PERFORMED, RETRYABLE_WRITE_ERROR},
    index::IndexModel,
    operation::{
        Access,
        ChangeStreamAggregate,
        Create,
        CreateIndexes,
        DropCollection,
        Operation,
        Retryability,
    },
    options::{ClusteredIndex, CreateCollectionOptions, DropCollectionOptions},
    Namespace,
};

/// Executes the given operation under the given binding, retrying it when the operation and the
/// failure allow.
pub async fn execute_operation<T: Operation>(
    binding: &dyn Binding,
    op: &mut T,
    ctx: &OperationContext,
) -> Result<T::O> {
    execute_with_details(binding, op, ctx)
        .await
        .map(|details| details.output)
}

/// Executes a cursor-producing operation, returning the streaming cursor over its results.
///
/// The cursor takes over the connection source the operation was executed on, and pins the
/// connection itself under load-balanced deployments.
pub async fn execute_cursor_operation<Op>(
    binding: &dyn Binding,
    op: &mut Op,
    ctx: &OperationContext,
) -> Result<CommandBatchCursor>
where
    Op: Operation<O = CursorSpecification>,
{
    let details = execute_with_details(binding, op, ctx).await?;
    let pinned = pin_connection_for_cursor(binding, &details.output, details.connection);
    Ok(CommandBatchCursor::new(
        details.output,
        Some(details.source),
        pinned,
        ctx.clone(),
    ))
}

/// Opens a change stream over the given target.
pub async fn execute_watch(
    binding: Arc<dyn Binding>,
    target: ChangeStreamTarget,
    pipeline: impl IntoIterator<Item = crate::bson::Document>,
    options: Option<ChangeStreamOptions>,
    ctx: OperationContext,
) -> Result<ChangeStream<ChangeStreamEvent>> {
    let args = WatchArgs {
        pipeline: pipeline.into_iter().collect(),
        target,
        options,
    };
    let (cursor, data) = execute_watch_inner(binding.as_ref(), &args, &ctx).await?;
    Ok(ChangeStream::new(cursor, args, data, binding, ctx))
}

pub(crate) async fn execute_watch_inner(
    binding: &dyn Binding,
    args: &WatchArgs,
    ctx: &OperationContext,
) -> Result<(CommandBatchCursor, ChangeStreamData)> {
    let mut op = ChangeStreamAggregate::new(args)?;
    let details = execute_with_details(binding, &mut op, ctx).await?;
    let (spec, data) = details.output;
    let pinned = pin_connection_for_cursor(binding, &spec, details.connection);
    let cursor = CommandBatchCursor::new(spec, Some(details.source), pinned, ctx.clone());
    Ok((cursor, data))
}

struct ExecutionDetails<O> {
    output: O,
    connection: Box<dyn Connection>,
    source: Arc<dyn ConnectionSource>,
}

struct ExecutionRetry {
    prior_txn_number: Option<i64>,
    first_error: Error,
}

trait RetryHelper {
    fn first_error(&mut self) -> Result<()>;
}

impl RetryHelper for Option<ExecutionRetry> {
    fn first_error(&mut self) -> Result<()> {
        match self.take() {
            Some(r) => Err(r.first_error),
            None => Ok(()),
        }
    }
}

async fn execute_with_details<T: Operation>(
    binding: &dyn Binding,
    op: &mut T,
    ctx: &OperationContext,
) -> Result<ExecutionDetails<T::O>> {
    if let Some(write_concern) = op.write_concern() {
        write_concern.validate()?;
    }
    if !op.is_acknowledged() {
        return Err(ErrorKind::InvalidArgument {
            message: "Unacknowledged write concerns are not supported".to_string(),
        }
        .into());
    }

    let mut retry: Option<ExecutionRetry> = None;
    loop {
        if retry.is_some() {
            op.update_for_retry();
        }
        ctx.timeout.remaining()?;

        let source = match acquire_source(binding, op).await {
            Ok(source) => source,
            Err(error) => {
                // A failed reselection reports the original failure.
                retry.first_error()?;
                return Err(error);
            }
        };

        let mut connection = match source.connection().await {
            Ok(connection) => connection,
            Err(mut error) => {
                retry.first_error()?;

                if error.is_read_retryable() && ctx.retry_writes() {
                    error.add_label(RETRYABLE_WRITE_ERROR);
                }
                let op_retry = match effective_op_retryability(op, ctx) {
                    Retryability::Read => error.is_read_retryable(),
                    Retryability::Write => error.is_write_retryable(),
                    Retryability::None => false,
                };
                if error.is_pool_cleared() || op_retry {
                    retry = Some(ExecutionRetry {
                        prior_txn_number: None,
                        first_error: error,
                    });
                    continue;
                }
                return Err(error);
            }
        };

        let retryability = effective_retryability(op, ctx, connection.as_ref())?;
        if retryability == Retryability::None {
            retry.first_error()?;
        }

        // The transaction number is allocated exactly once per logical write; retries reuse it
        // so the server can deduplicate re-delivered attempts.
        let txn_number = retry
            .as_ref()
            .and_then(|r| r.prior_txn_number)
            .or_else(|| {
                (retryability == Retryability::Write)
                    .then(|| ctx.session.allocate_txn_number())
            });

        match execute_on_connection(op, connection.as_mut(), ctx, txn_number).await {
            Ok(output) => {
                return Ok(ExecutionDetails {
                    output,
                    connection,
                    source,
                });
            }
            Err(mut error) => {
                error.wire_version = connection
                    .stream_description()
                    .ok()
                    .and_then(|d| d.max_wire_version);

                if retryability == Retryability::Write {
                    if let Some(wire_version) = error.wire_version {
                        if error.should_add_retryable_write_label(wire_version) {
                            error.add_label(RETRYABLE_WRITE_ERROR);
                        }
                    }
                }

                drop(connection);
                drop(source);

                if let Some(r) = retry {
                    // On a second failure, prefer reporting the more recent server-sourced
                    // error unless it performed no writes at all.
                    if (error.is_server_error()
                        || error.is_read_retryable()
                        || error.is_write_retryable())
                        && !error.contains_label(NO_WRITES_PERFORMED)
                    {
                        return Err(error);
                    }
                    return Err(r.first_error);
                } else if retryability == Retryability::Read && error.is_read_retryable()
                    || retryability == Retryability::Write && error.is_write_retryable()
                {
                    retry = Some(ExecutionRetry {
                        prior_txn_number: txn_number,
                        first_error: error,
                    });
                    continue;
                } else {
                    return Err(error);
                }
            }
        }
    }
}

/// Executes one attempt of an operation on an already-acquired connection: builds the command,
/// applies the context decorations, performs the wire call, and interprets the response.
pub(crate) async fn execute_on_connection<T: Operation>(
    op: &mut T,
    connection: &mut dyn Connection,
    ctx: &OperationContext,
    txn_number: Option<i64>,
) -> Result<T::O> {
    let description = connection.stream_description()?.clone();
    let mut cmd = op.build(ctx, &description)?;

    if op.access() == Access::Read {
        if let Some(criteria) = op.selection_criteria() {
            cmd.set_read_preference_from_criteria(criteria);
        }
    }
    if let Some(txn_number) = txn_number {
        cmd.set_txn_number(txn_number);
    }
    if let Some(ref server_api) = ctx.server_api {
        cmd.set_server_api(server_api);
    }

    let request_id = next_request_id();
    let command_name = cmd.name.clone();
    let target_db = cmd.target_db.clone();
    tracing::debug!(
        command = %command_name,
        request_id,
        database = %target_db,
        "command started"
    );

    let start_time = Instant::now();
    let result = connection.send_command(cmd, request_id).await;
    let duration = start_time.elapsed();

    let validated = result.and_then(|response| {
        response.validate()?;
        Ok(response)
    });

    match validated {
        Ok(response) => {
            tracing::debug!(
                command = %command_name,
                request_id,
                ?duration,
                "command succeeded"
            );
            op.handle_response(response, &description)
        }
        Err(error) => {
            tracing::debug!(
                command = %command_name,
                request_id,
                ?duration,
                %error,
                "command failed"
            );
            op.handle_error(error)
        }
    }
}

async fn acquire_source<T: Operation>(
    binding: &dyn Binding,
    op: &T,
) -> Result<Arc<dyn ConnectionSource>> {
    match op.access() {
        Access::Read => binding.read_source(op.selection_criteria()).await,
        Access::Write => binding.write_source().await,
    }
}

/// The retryability of this operation under this context, before server capabilities are known.
fn effective_op_retryability<T: Operation>(op: &T, ctx: &OperationContext) -> Retryability {
    if ctx.session.in_transaction {
        return Retryability::None;
    }
    match op.retryability() {
        Retryability::Read if ctx.retry_reads() => Retryability::Read,
        Retryability::Write if ctx.retry_writes() => Retryability::Write,
        _ => Retryability::None,
    }
}

/// The retryability of this operation on this connection.
fn effective_retryability<T: Operation>(
    op: &T,
    ctx: &OperationContext,
    connection: &dyn Connection,
) -> Result<Retryability> {
    match effective_op_retryability(op, ctx) {
        Retryability::Write if connection.stream_description()?.supports_retryable_writes() => {
            Ok(Retryability::Write)
        }
        Retryability::Write => Ok(Retryability::None),
        other => Ok(other),
    }
}

fn pin_connection_for_cursor(
    binding: &dyn Binding,
    spec: &CursorSpecification,
    connection: Box<dyn Connection>,
) -> Option<PinnedConnectionHandle> {
    if binding.is_load_balanced() && spec.id() != 0 {
        Some(PinnedConnectionHandle::new(connection))
    } else {
        None
    }
}

/// Creates a collection.
///
/// When the options carry `encryptedFields`, the create fans out into an ordered chain: the
/// three auxiliary state collections are created with default clustered-index options, then the
/// main collection, then the `__safeContent__` index. Any failure short-circuits the chain.
pub async fn create_collection(
    binding: &dyn Binding,
    ns: Namespace,
    options: Option<CreateCollectionOptions>,
    ctx: &OperationContext,
) -> Result<()> {
    let encrypted_fields = options
        .as_ref()
        .and_then(|options| options.encrypted_fields.clone());

    if let Some(ref encrypted_fields) = encrypted_fields {
        for aux_ns in aux_collections(&ns, encrypted_fields)? {
            let mut aux_options = options.clone().unwrap_or_default();
            aux_options.clustered_index = Some(ClusteredIndex::default());
            aux_options.encrypted_fields = None;
            let mut create = Create::new(aux_ns, Some(aux_options));
            execute_operation(binding, &mut create, ctx).await?;
        }
    }

    let mut create = Create::new(ns.clone(), options);
    execute_operation(binding, &mut create, ctx).await?;

    if encrypted_fields.is_some() {
        let index = IndexModel::builder()
            .keys(doc! { "__safeContent__": 1 })
            .build();
        let mut create_index = CreateIndexes::new(ns, vec![index], None);
        execute_operation(binding, &mut create_index, ctx).await?;
    }

    Ok(())
}

/// Drops a collection.
///
/// When the options carry `encryptedFields`, the drop mirrors the encrypted create chain: the
/// main collection is dropped first, then the auxiliary state collections. Namespace-not-found
/// failures are swallowed at every step so that a partially created set still drops cleanly.
pub async fn drop_collection(
    binding: &dyn Binding,
    ns: Namespace,
    options: Option<DropCollectionOptions>,
    ctx: &OperationContext,
) -> Result<()> {
    let encrypted_fields = options
        .as_ref()
        .and_then(|options| options.encrypted_fields.clone());

    let mut drop = DropCollection::new(ns.clone(), options.clone());
    execute_operation(binding, &mut drop, ctx).await?;

    if let Some(ref encrypted_fields) = encrypted_fields {
        for aux_ns in aux_collections(&ns, encrypted_fields)? {
            let mut drop = DropCollection::new(aux_ns, options.clone());
            execute_operation(binding, &mut drop, ctx).await?;
        }
    }

    Ok(())
}

/// The auxiliary state collections backing a queryable-encryption collection, in chain order.
/// The default `enxcol_.<coll>.<suffix>` names can be overridden by the corresponding
/// `<suffix>Collection` entries of `encryptedFields`.
pub(crate) fn aux_collections(
    base_ns: &Namespace,
    encrypted_fields: &crate::bson::Document,
) -> Result<Vec<Namespace>> {
    let mut out = vec![];
    for &key in &["esc", "ecc", "ecoc"] {
        let coll = match encrypted_fields.get_str(format!("{}Collection", key)) {
            Ok(s) => s.to_string(),
            Err(_) => format!("enxcol_.{}.{}", base_ns.coll, key),
        };
        out.push(Namespace {
            coll,
            ..base_ns.clone()
        });
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aux_collection_names() {
        let ns = Namespace::new("test", "fle");
        let names: Vec<_> = aux_collections(&ns, &doc! {})
            .unwrap()
            .into_iter()
            .map(|ns| ns.coll)
            .collect();
        assert_eq!(
            names,
            vec!["enxcol_.fle.esc", "enxcol_.fle.ecc", "enxcol_.fle.ecoc"]
        );
    }

    #[test]
    fn aux_collection_name_overrides() {
        let ns = Namespace::new("test", "fle");
        let fields = doc! { "escCollection": "custom.esc" };
        let names: Vec<_> = aux_collections(&ns, &fields)
            .unwrap()
            .into_iter()
            .map(|ns| ns.coll)
            .collect();
        assert_eq!(
            names,
            vec!["custom.esc", "enxcol_.fle.ecc", "enxcol_.fle.ecoc"]
        );
    }
}
