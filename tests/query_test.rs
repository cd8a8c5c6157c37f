//! End-to-end query execution and result scanning over the wire.

mod support;

use std::time::Duration;
use support::{optional_u32_result_set, test_config, MockServer, Reaction};
use ydb::proto::{
    ExecuteQueryResult, Operation, Payload, RequestBody, ResultSet, StatusCode, StreamPart,
};
use ydb::{Context, Driver, Session};

fn rows_u32(values: &[u32]) -> ResultSet {
    ResultSet {
        columns: vec![ydb::proto::Column {
            name: "n".to_string(),
            ty: ydb::proto::Type::Uint32,
        }],
        rows: values
            .iter()
            .map(|v| ydb::proto::Row {
                items: vec![ydb::proto::Value::Uint32(*v)],
            })
            .collect(),
        truncated: false,
    }
}

#[tokio::test]
async fn test_scan_round_trip_over_the_wire() {
    let server = MockServer::start_with(|frame| match &frame.body {
        RequestBody::ExecuteDataQuery(_) => Some(Reaction::Operation(Operation::success(
            Payload::ExecuteQuery(ExecuteQueryResult {
                result_sets: vec![optional_u32_result_set(&[Some(5), None, Some(7)])],
            }),
        ))),
        _ => None,
    })
    .await;
    let driver = Driver::connect(test_config(server.addr())).unwrap();
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    // Nullable destinations preserve NULL.
    let mut nullable: Vec<Option<u32>> = Vec::new();
    let session = Session::create(&ctx, driver.cluster()).await.unwrap();
    let result = session.execute_query(&ctx, "SELECT value FROM t;").await.unwrap();
    let mut reader = result.into_first().unwrap();
    while reader.next_row() {
        let mut v: Option<u32> = None;
        reader.scan((&mut v,)).unwrap();
        nullable.push(v);
    }
    assert!(reader.err().is_none());
    assert_eq!(nullable, vec![Some(5), None, Some(7)]);

    // Defaults mode writes zero instead.
    let mut defaulted: Vec<u32> = Vec::new();
    let result = session.execute_query(&ctx, "SELECT value FROM t;").await.unwrap();
    let mut reader = result.into_first().unwrap();
    while reader.next_row() {
        let mut v: u32 = 42;
        reader.scan_with_defaults((&mut v,)).unwrap();
        defaulted.push(v);
    }
    assert_eq!(defaulted, vec![5, 0, 7]);

    session.close(&ctx).await.unwrap();
    driver.close(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_retry_loop_runs_a_query_end_to_end() {
    let server = MockServer::start_with(|frame| match &frame.body {
        RequestBody::ExecuteDataQuery(_) => Some(Reaction::Operation(Operation::success(
            Payload::ExecuteQuery(ExecuteQueryResult {
                result_sets: vec![rows_u32(&[11, 22])],
            }),
        ))),
        _ => None,
    })
    .await;
    let driver = Driver::connect(test_config(server.addr())).unwrap();
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    let collected = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&collected);
    driver
        .retry(&ctx, true, move |ctx, session| {
            let sink = std::sync::Arc::clone(&sink);
            async move {
                let result = session.execute_query(&ctx, "SELECT n FROM t;").await?;
                if let Some(mut reader) = result.into_first() {
                    while reader.next_row() {
                        let mut n: u32 = 0;
                        let _ = reader.scan((&mut n,));
                        sink.lock().unwrap().push(n);
                    }
                }
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(*collected.lock().unwrap(), vec![11, 22]);
    driver.close(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_stream_scan_query_yields_sets_in_order() {
    let server = MockServer::start_with(|frame| match &frame.body {
        RequestBody::StreamExecuteScanQuery(_) => Some(Reaction::Stream(vec![
            StreamPart {
                status: StatusCode::Success,
                issues: vec![],
                result_set: Some(rows_u32(&[1, 2])),
                done: false,
            },
            StreamPart {
                status: StatusCode::Success,
                issues: vec![],
                result_set: Some(rows_u32(&[3])),
                done: false,
            },
            StreamPart {
                status: StatusCode::Success,
                issues: vec![],
                result_set: None,
                done: true,
            },
        ])),
        _ => None,
    })
    .await;
    let driver = Driver::connect(test_config(server.addr())).unwrap();
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    let session = Session::create(&ctx, driver.cluster()).await.unwrap();
    let mut stream = session.stream_scan_query(&ctx, "SELECT n FROM big;").await.unwrap();

    let mut seen = Vec::new();
    while let Some(reader) = stream.next_result_set().await {
        let mut reader = reader.unwrap();
        while reader.next_row() {
            let mut n: u32 = 0;
            reader.scan((&mut n,)).unwrap();
            seen.push(n);
        }
    }
    assert_eq!(seen, vec![1, 2, 3]);

    session.close(&ctx).await.unwrap();
    driver.close(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_operation_failure_carries_issues() {
    let server = MockServer::start_with(|frame| match &frame.body {
        RequestBody::ExecuteDataQuery(_) => Some(Reaction::Operation(Operation::failure(
            StatusCode::SchemeError,
            vec![ydb::proto::Issue::new(2018, "path not found")],
        ))),
        _ => None,
    })
    .await;
    let driver = Driver::connect(test_config(server.addr())).unwrap();
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    let session = Session::create(&ctx, driver.cluster()).await.unwrap();
    let err = session
        .execute_query(&ctx, "SELECT * FROM missing;")
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("SCHEME_ERROR"), "{text}");
    assert!(text.contains("path not found"), "{text}");

    session.close(&ctx).await.unwrap();
    driver.close(&Context::background()).await.unwrap();
}
