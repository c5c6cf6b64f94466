//! End-to-end tests driving the executor, cursors, and change streams against a scripted
//! in-process server.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use futures_core::future::BoxFuture;

use crate::{
    bson::{doc, Bson, Document, Timestamp},
    change_stream::ChangeStreamTarget,
    concern::{Acknowledgment, WriteConcern},
    conn::{
        Binding,
        Command,
        Connection,
        ConnectionSource,
        RawCommandResponse,
        ServerAddress,
        StreamDescription,
    },
    error::{Error, ErrorKind, Result},
    executor,
    operation::{Aggregate, Count, Find, FindAndModify},
    options::{
        AggregateOptions,
        EstimatedDocumentCountOptions,
        FindOneAndUpdateOptions,
        FindOptions,
        UpdateModifications,
    },
    selection_criteria::SelectionCriteria,
    Namespace,
    OperationContext,
};

/// One entry in a mock server's script: either a reply document or a transport-level failure.
enum Reply {
    Ok(Document),
    Err(Error),
}

/// A scripted server shared by every connection a test binding hands out. Replies are consumed
/// in order; every command sent is recorded for assertion.
struct MockServer {
    description: StreamDescription,
    replies: Mutex<VecDeque<Reply>>,
    commands: Mutex<Vec<Command>>,
    checkouts: Mutex<usize>,
}

impl MockServer {
    fn new(max_wire_version: i32, replies: Vec<Reply>) -> Arc<Self> {
        Self::with_description(StreamDescription::with_wire_version(max_wire_version), replies)
    }

    fn with_description(description: StreamDescription, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            description,
            replies: Mutex::new(replies.into()),
            commands: Mutex::new(Vec::new()),
            checkouts: Mutex::new(0),
        })
    }

    fn checkouts(&self) -> usize {
        *self.checkouts.lock().unwrap()
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    fn command_names(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.name).collect()
    }
}

struct MockConnection {
    server: Arc<MockServer>,
    description: StreamDescription,
}

impl Connection for MockConnection {
    fn stream_description(&self) -> Result<&StreamDescription> {
        Ok(&self.description)
    }

    fn send_command<'a>(
        &'a mut self,
        command: Command,
        _request_id: i32,
    ) -> BoxFuture<'a, Result<RawCommandResponse>> {
        let server = Arc::clone(&self.server);
        Box::pin(async move {
            server.commands.lock().unwrap().push(command);
            match server.replies.lock().unwrap().pop_front() {
                Some(Reply::Ok(doc)) => {
                    RawCommandResponse::with_document_and_address(ServerAddress::default(), doc)
                }
                Some(Reply::Err(error)) => Err(error),
                None => Err(Error::internal("mock server script exhausted")),
            }
        })
    }
}

struct MockSource {
    server: Arc<MockServer>,
    address: ServerAddress,
}

impl ConnectionSource for MockSource {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn connection(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>> {
        let server = Arc::clone(&self.server);
        Box::pin(async move {
            *server.checkouts.lock().unwrap() += 1;
            Ok(Box::new(MockConnection {
                description: server.description.clone(),
                server,
            }) as Box<dyn Connection>)
        })
    }
}

struct MockBinding {
    server: Arc<MockServer>,
    load_balanced: bool,
}

impl MockBinding {
    fn new(server: &Arc<MockServer>) -> Self {
        Self {
            server: Arc::clone(server),
            load_balanced: false,
        }
    }
}

impl Binding for MockBinding {
    fn read_source<'a>(
        &'a self,
        _criteria: Option<&'a SelectionCriteria>,
    ) -> BoxFuture<'a, Result<Arc<dyn ConnectionSource>>> {
        Box::pin(async move {
            Ok(Arc::new(MockSource {
                server: Arc::clone(&self.server),
                address: ServerAddress::default(),
            }) as Arc<dyn ConnectionSource>)
        })
    }

    fn write_source(&self) -> BoxFuture<'_, Result<Arc<dyn ConnectionSource>>> {
        self.read_source(None)
    }

    fn is_load_balanced(&self) -> bool {
        self.load_balanced
    }
}

fn network_error() -> Error {
    Error::from(std::io::ErrorKind::ConnectionReset)
}

fn ns_not_found() -> Document {
    doc! { "ok": 0, "code": 26, "codeName": "NamespaceNotFound", "errmsg": "ns not found" }
}

#[tokio::test]
async fn aggregate_iterates_batches_and_exhausts_without_kill() {
    let server = MockServer::new(9, vec![
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 42_i64, "ns": "test.users", "firstBatch": [ { "_id": 1 } ] },
        }),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test.users", "nextBatch": [ { "_id": 2 } ] },
        }),
    ]);
    let binding = MockBinding::new(&server);

    let pipeline = vec![
        doc! { "$match": { "age": { "$gte": 18 } } },
        doc! { "$limit": 2 },
    ];
    let options = AggregateOptions::builder().batch_size(1_u32).build();
    let mut op = Aggregate::new(
        Namespace::new("test", "users"),
        pipeline.clone(),
        Some(options),
    );

    let ctx = OperationContext::new();
    let mut cursor = executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(doc) = cursor.next().await.unwrap() {
        ids.push(doc.get_i32("_id").unwrap());
    }
    assert_eq!(ids, vec![1, 2]);
    assert!(cursor.is_exhausted());
    cursor.close().await;

    let commands = server.commands();
    assert_eq!(server.command_names(), vec!["aggregate", "getMore"]);

    // The initial command leads with its target and pipeline, and communicates the batch size
    // through the cursor sub-document.
    let aggregate = &commands[0].body;
    let keys: Vec<_> = aggregate.keys().take(3).collect();
    assert_eq!(keys, vec!["aggregate", "pipeline", "cursor"]);
    assert_eq!(aggregate.get_str("aggregate").unwrap(), "users");
    assert_eq!(
        aggregate.get_document("cursor").unwrap(),
        &doc! { "batchSize": 1_i32 }
    );

    assert_eq!(
        commands[1].body,
        doc! { "getMore": 42_i64, "collection": "users", "batchSize": 1_i32 }
    );
}

#[tokio::test]
async fn negative_limit_caps_delivery_and_kills_live_cursor() {
    let server = MockServer::new(9, vec![
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": {
                "id": 42_i64,
                "ns": "test.users",
                "firstBatch": [ { "x": 1 }, { "x": 2 }, { "x": 3 }, { "x": 4 } ],
            },
        }),
        Reply::Ok(doc! { "ok": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let options = FindOptions::builder().limit(-3_i64).build();
    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, Some(options));

    let ctx = OperationContext::new();
    let mut cursor = executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();

    let mut count = 0;
    while cursor.next().await.unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
    cursor.close().await;

    let commands = server.commands();
    assert_eq!(server.command_names(), vec!["find", "killCursors"]);
    assert_eq!(commands[0].body.get("limit"), Some(&Bson::Int64(3)));
    assert_eq!(commands[0].body.get("singleBatch"), Some(&Bson::Boolean(true)));
    assert_eq!(
        commands[1].body,
        doc! { "killCursors": "users", "cursors": [42_i64] }
    );
}

#[tokio::test]
async fn retryable_write_reuses_the_transaction_number() {
    let server = MockServer::new(9, vec![
        Reply::Err(network_error()),
        Reply::Ok(doc! { "ok": 1, "value": { "_id": 7, "x": 1 } }),
    ]);
    let binding = MockBinding::new(&server);

    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .write_concern(WriteConcern::from(Acknowledgment::Majority))
        .build();
    let mut op = FindAndModify::with_update(
        Namespace::new("test", "users"),
        doc! { "_id": 7 },
        UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
        Some(options),
    )
    .unwrap();

    let ctx = OperationContext::new();
    let result = executor::execute_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();
    assert_eq!(result, Some(doc! { "_id": 7, "x": 1 }));

    let commands = server.commands();
    assert_eq!(server.command_names(), vec!["findAndModify", "findAndModify"]);
    for command in &commands {
        assert_eq!(command.body.get("txnNumber"), Some(&Bson::Int64(1)));
        assert_eq!(command.body.get("upsert"), Some(&Bson::Boolean(true)));
        assert_eq!(command.body.get("new"), Some(&Bson::Boolean(true)));
        assert_eq!(
            command.body.get_document("writeConcern").unwrap(),
            &doc! { "w": "majority" }
        );
    }
}

#[tokio::test]
async fn failed_retry_carries_the_retryable_write_label() {
    let server = MockServer::new(9, vec![
        Reply::Err(network_error()),
        Reply::Err(network_error()),
    ]);
    let binding = MockBinding::new(&server);

    let mut op = FindAndModify::with_update(
        Namespace::new("test", "users"),
        doc! { "_id": 7 },
        UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
        None,
    )
    .unwrap();

    let ctx = OperationContext::new();
    let error = executor::execute_operation(&binding, &mut op, &ctx)
        .await
        .unwrap_err();
    assert!(error.contains_label(crate::error::RETRYABLE_WRITE_ERROR));
    assert_eq!(server.command_names().len(), 2);
}

#[tokio::test]
async fn retryable_reads_reselect_and_succeed() {
    let server = MockServer::new(9, vec![
        Reply::Err(network_error()),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test.users", "firstBatch": [ { "x": 1 } ] },
        }),
    ]);
    let binding = MockBinding::new(&server);

    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    let ctx = OperationContext::new();
    let mut cursor = executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();
    assert!(cursor.next().await.unwrap().is_some());
    assert_eq!(server.command_names(), vec!["find", "find"]);
}

#[tokio::test]
async fn disabled_retries_fail_fast() {
    let server = MockServer::new(9, vec![Reply::Err(network_error())]);
    let binding = MockBinding::new(&server);

    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    let mut ctx = OperationContext::new();
    ctx.retry_reads = Some(false);
    executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap_err();
    assert_eq!(server.command_names().len(), 1);
}

#[tokio::test]
async fn change_stream_resumes_from_operation_time() {
    let t0 = Timestamp {
        time: 1660000000,
        increment: 1,
    };
    let token = doc! { "_data": "8262E2" };
    let server = MockServer::new(8, vec![
        // Initial aggregate: empty first batch plus an operation time to resume from.
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 5_i64, "ns": "test.orders", "firstBatch": [] },
            "operationTime": t0,
        }),
        // The first getMore dies on the wire.
        Reply::Err(network_error()),
        // Resume: the old cursor is killed, then the aggregate is re-run.
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 6_i64, "ns": "test.orders", "firstBatch": [] },
            "operationTime": t0,
        }),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": {
                "id": 6_i64,
                "ns": "test.orders",
                "nextBatch": [ { "_id": token.clone(), "operationType": "insert" } ],
            },
        }),
    ]);
    let binding: Arc<dyn Binding> = Arc::new(MockBinding::new(&server));

    let mut stream = executor::execute_watch(
        binding,
        ChangeStreamTarget::Collection(Namespace::new("test", "orders")),
        Vec::new(),
        None,
        OperationContext::new(),
    )
    .await
    .unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.operation_type, crate::change_stream::event::OperationType::Insert);
    assert_eq!(
        stream.resume_token().unwrap().to_bson().unwrap(),
        Bson::Document(token)
    );

    let commands = server.commands();
    assert_eq!(
        server.command_names(),
        vec!["aggregate", "getMore", "killCursors", "aggregate", "getMore"]
    );

    // The initial pipeline begins with a bare $changeStream stage.
    let initial_stage = commands[0].body.get_array("pipeline").unwrap()[0]
        .as_document()
        .unwrap()
        .clone();
    assert_eq!(initial_stage, doc! { "$changeStream": {} });

    // The resumed pipeline carries the captured operation time.
    let resumed_stage = commands[3].body.get_array("pipeline").unwrap()[0]
        .as_document()
        .unwrap()
        .clone();
    assert_eq!(
        resumed_stage,
        doc! { "$changeStream": { "startAtOperationTime": t0 } }
    );
}

#[tokio::test]
async fn change_stream_tracks_document_resume_tokens() {
    let token1 = doc! { "_data": "01" };
    let token2 = doc! { "_data": "02" };
    let server = MockServer::new(9, vec![Reply::Ok(doc! {
        "ok": 1,
        "cursor": {
            "id": 9_i64,
            "ns": "test.orders",
            "firstBatch": [
                { "_id": token1.clone(), "operationType": "insert" },
                { "_id": token2.clone(), "operationType": "delete" },
            ],
        },
    })]);
    let binding: Arc<dyn Binding> = Arc::new(MockBinding::new(&server));

    let mut stream = executor::execute_watch(
        binding,
        ChangeStreamTarget::Collection(Namespace::new("test", "orders")),
        Vec::new(),
        None,
        OperationContext::new(),
    )
    .await
    .unwrap();

    stream.next_if_any().await.unwrap().unwrap();
    assert_eq!(
        stream.resume_token().unwrap().to_bson().unwrap(),
        Bson::Document(token1)
    );
    stream.next_if_any().await.unwrap().unwrap();
    assert_eq!(
        stream.resume_token().unwrap().to_bson().unwrap(),
        Bson::Document(token2)
    );
}

#[tokio::test]
async fn encrypted_drop_chains_and_swallows_missing_namespaces() {
    let server = MockServer::new(21, vec![
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(ns_not_found()),
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! { "ok": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let options = crate::options::DropCollectionOptions::builder()
        .encrypted_fields(doc! { "fields": [] })
        .build();
    executor::drop_collection(
        &binding,
        Namespace::new("test", "fle"),
        Some(options),
        &OperationContext::new(),
    )
    .await
    .unwrap();

    let commands = server.commands();
    assert_eq!(
        server.command_names(),
        vec!["drop", "drop", "drop", "drop"]
    );
    let dropped: Vec<_> = commands
        .iter()
        .map(|c| c.body.get_str("drop").unwrap().to_string())
        .collect();
    assert_eq!(
        dropped,
        vec!["fle", "enxcol_.fle.esc", "enxcol_.fle.ecc", "enxcol_.fle.ecoc"]
    );
}

#[tokio::test]
async fn encrypted_create_chains_state_collections_and_index() {
    let server = MockServer::new(21, vec![
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! { "ok": 1 }),
        Reply::Ok(doc! { "ok": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let options = crate::options::CreateCollectionOptions::builder()
        .encrypted_fields(doc! { "fields": [] })
        .build();
    executor::create_collection(
        &binding,
        Namespace::new("test", "fle"),
        Some(options),
        &OperationContext::new(),
    )
    .await
    .unwrap();

    let commands = server.commands();
    assert_eq!(
        server.command_names(),
        vec!["create", "create", "create", "create", "createIndexes"]
    );
    let created: Vec<_> = commands[..4]
        .iter()
        .map(|c| c.body.get_str("create").unwrap().to_string())
        .collect();
    assert_eq!(
        created,
        vec!["enxcol_.fle.esc", "enxcol_.fle.ecc", "enxcol_.fle.ecoc", "fle"]
    );

    // Auxiliary collections are created with the default clustered index.
    assert_eq!(
        commands[0].body.get_document("clusteredIndex").unwrap(),
        &doc! { "key": { "_id": 1 }, "unique": true }
    );

    // The main collection gets the safe-content index.
    let index = commands[4].body.get_array("indexes").unwrap()[0]
        .as_document()
        .unwrap();
    assert_eq!(index.get_document("key").unwrap(), &doc! { "__safeContent__": 1 });
}

#[tokio::test]
async fn load_balanced_cursors_pin_their_connection() {
    let replies = vec![
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 42_i64, "ns": "test.users", "firstBatch": [ { "x": 1 } ] },
        }),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test.users", "nextBatch": [] },
        }),
    ];

    // Load-balanced mode: every command for the cursor's lifetime flows through the one pinned
    // connection.
    let server = MockServer::new(9, replies);
    let mut binding = MockBinding::new(&server);
    binding.load_balanced = true;
    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    let mut cursor =
        executor::execute_cursor_operation(&binding, &mut op, &OperationContext::new())
            .await
            .unwrap();
    while cursor.next().await.unwrap().is_some() {}
    cursor.close().await;
    assert_eq!(server.checkouts(), 1);

    // Without load balancing, the getMore checks a fresh connection out of the source.
    let server = MockServer::new(9, vec![
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 42_i64, "ns": "test.users", "firstBatch": [ { "x": 1 } ] },
        }),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test.users", "nextBatch": [] },
        }),
    ]);
    let binding = MockBinding::new(&server);
    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    let mut cursor =
        executor::execute_cursor_operation(&binding, &mut op, &OperationContext::new())
            .await
            .unwrap();
    while cursor.next().await.unwrap().is_some() {}
    cursor.close().await;
    assert_eq!(server.checkouts(), 2);
}

#[tokio::test]
async fn estimated_count_of_missing_namespace_is_zero() {
    let server = MockServer::new(9, vec![Reply::Ok(ns_not_found())]);
    let binding = MockBinding::new(&server);

    let mut op = Count::new(
        Namespace::new("test", "absent"),
        None::<EstimatedDocumentCountOptions>,
    );
    let count = executor::execute_operation(&binding, &mut op, &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn cursor_failure_leaves_the_cursor_operable() {
    let server = MockServer::new(9, vec![
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 42_i64, "ns": "test.users", "firstBatch": [ { "x": 1 } ] },
        }),
        Reply::Err(network_error()),
        Reply::Ok(doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test.users", "nextBatch": [ { "x": 2 } ] },
        }),
    ]);
    let binding = MockBinding::new(&server);

    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    let ctx = OperationContext::new();
    let mut cursor = executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();

    assert!(cursor.next().await.unwrap().is_some());
    // The failed getMore surfaces its error but the cursor can be retried.
    cursor.next().await.unwrap_err();
    assert!(!cursor.is_exhausted());
    assert!(cursor.next().await.unwrap().is_some());
    assert!(cursor.next().await.unwrap().is_none());
}

#[tokio::test]
async fn bulk_write_aggregates_mixed_models() {
    use crate::operation::{BulkWrite, WriteModel};

    let server = MockServer::new(9, vec![
        Reply::Ok(doc! { "ok": 1, "n": 2 }),
        Reply::Ok(doc! { "ok": 1, "n": 1, "nModified": 1 }),
        Reply::Ok(doc! { "ok": 1, "n": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let bulk = BulkWrite::new(
        Namespace::new("test", "users"),
        vec![
            WriteModel::InsertOne {
                document: doc! { "_id": 1 },
            },
            WriteModel::InsertOne {
                document: doc! { "_id": 2 },
            },
            WriteModel::UpdateOne {
                filter: doc! { "_id": 1 },
                update: UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
                options: None,
            },
            WriteModel::DeleteOne {
                filter: doc! { "_id": 2 },
                options: None,
            },
        ],
        true,
        None,
    );

    let result = bulk.execute(&binding, &OperationContext::new()).await.unwrap();
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.deleted_count, 1);
    assert_eq!(server.command_names(), vec!["insert", "update", "delete"]);
}

#[tokio::test]
async fn unordered_bulk_write_continues_past_duplicate_keys() {
    use crate::operation::{BulkWrite, WriteModel};

    let server = MockServer::new(9, vec![
        Reply::Ok(doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [
                { "index": 1, "code": 11000, "errmsg": "E11000 duplicate key" }
            ],
        }),
        Reply::Ok(doc! { "ok": 1, "n": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let bulk = BulkWrite::new(
        Namespace::new("test", "users"),
        vec![
            WriteModel::InsertOne {
                document: doc! { "_id": 1 },
            },
            WriteModel::InsertOne {
                document: doc! { "_id": 1 },
            },
            WriteModel::DeleteOne {
                filter: doc! { "_id": 3 },
                options: None,
            },
        ],
        false,
        None,
    );

    let error = bulk
        .execute(&binding, &OperationContext::new())
        .await
        .unwrap_err();
    match *error.kind {
        ErrorKind::BulkWrite(ref failure) => {
            let write_errors = failure.write_errors.as_ref().unwrap();
            assert_eq!(write_errors.len(), 1);
            assert_eq!(write_errors[0].index, 1);
            let partial = failure.partial_result.as_ref().unwrap();
            assert_eq!(partial.inserted_count, 1);
            assert_eq!(partial.deleted_count, 1);
        }
        ref other => panic!("expected bulk write failure, got {:?}", other),
    }
    // Unordered execution reached the delete after the failed insert.
    assert_eq!(server.command_names(), vec!["insert", "delete"]);
}

#[tokio::test]
async fn single_insert_translates_duplicate_keys() {
    use crate::operation::InsertOne;

    let server = MockServer::new(9, vec![
        Reply::Ok(doc! { "ok": 1, "n": 1 }),
        Reply::Ok(doc! {
            "ok": 1,
            "n": 0,
            "writeErrors": [
                { "index": 0, "code": 11000, "errmsg": "E11000 duplicate key" }
            ],
        }),
    ]);
    let binding = MockBinding::new(&server);

    let mut op = InsertOne::new(Namespace::new("test", "users"), doc! { "_id": 1 }, None);
    let response = executor::execute_operation(&binding, &mut op, &OperationContext::new())
        .await
        .unwrap();
    assert_eq!(response, doc! { "ok": 1, "n": 1_i64 });

    let mut op = InsertOne::new(Namespace::new("test", "users"), doc! { "_id": 1 }, None);
    let error = executor::execute_operation(&binding, &mut op, &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::DuplicateKey(_)));
}

#[tokio::test]
async fn bulk_insert_splits_at_the_server_batch_limit() {
    use crate::operation::{BulkWrite, WriteModel};

    let mut description = StreamDescription::with_wire_version(9);
    description.max_write_batch_size = Some(2);
    let server = MockServer::with_description(description, vec![
        Reply::Ok(doc! { "ok": 1, "n": 2 }),
        Reply::Ok(doc! { "ok": 1, "n": 1 }),
    ]);
    let binding = MockBinding::new(&server);

    let bulk = BulkWrite::new(
        Namespace::new("test", "users"),
        (1..=3)
            .map(|i| WriteModel::InsertOne {
                document: doc! { "_id": i },
            })
            .collect(),
        true,
        None,
    );
    let result = bulk.execute(&binding, &OperationContext::new()).await.unwrap();
    assert_eq!(result.inserted_count, 3);
    assert_eq!(result.inserted_ids.len(), 3);

    let commands = server.commands();
    assert_eq!(server.command_names(), vec!["insert", "insert"]);
    assert_eq!(commands[0].body.get_array("documents").unwrap().len(), 2);
    assert_eq!(commands[1].body.get_array("documents").unwrap().len(), 1);
}

#[tokio::test]
async fn session_read_concern_applies_to_reads() {
    let server = MockServer::new(9, vec![Reply::Ok(doc! {
        "ok": 1,
        "cursor": { "id": 0_i64, "ns": "test.users", "firstBatch": [] },
    })]);
    let binding = MockBinding::new(&server);

    let session = crate::SessionContext::new(Some(crate::concern::ReadConcern::majority()), None);
    let ctx = OperationContext::new().with_session(Arc::new(session));
    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap();

    let commands = server.commands();
    assert_eq!(
        commands[0].body.get_document("readConcern").unwrap(),
        &doc! { "level": "majority" }
    );
}

#[tokio::test]
async fn in_transaction_operations_are_not_retried() {
    let server = MockServer::new(9, vec![Reply::Err(network_error())]);
    let binding = MockBinding::new(&server);

    let mut session = crate::SessionContext::default();
    session.in_transaction = true;
    let ctx = OperationContext::new().with_session(Arc::new(session));

    let mut op = Find::new(Namespace::new("test", "users"), doc! {}, None);
    executor::execute_cursor_operation(&binding, &mut op, &ctx)
        .await
        .unwrap_err();
    assert_eq!(server.command_names().len(), 1);
}
