use chaingraph_bus::{
    partition_for, Broker, CommandKind, CommandMessage, CommandPayloadBody, ExecutionOptions, InMemoryBroker,
    TaskContext, TaskMessage, SCHEMA_VERSION,
};
use std::sync::Arc;

fn create_command(id: &str, flow_id: &str) -> CommandMessage {
    CommandMessage {
        schema_version: SCHEMA_VERSION,
        id: id.to_string(),
        execution_id: None,
        command: CommandKind::Create,
        payload: CommandPayloadBody {
            flow_id: flow_id.to_string(),
            options: Some(ExecutionOptions {
                max_concurrency: Some(4),
                node_timeout_ms: None,
                flow_timeout_ms: None,
            }),
            integrations: None,
            parent_execution_id: None,
            event_data: None,
            external_events: None,
            execution_depth: None,
        },
        timestamp: 0,
        request_id: "req-1".to_string(),
    }
}

#[tokio::test]
async fn replaying_create_with_same_id_produces_one_delivery() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut cursor = broker.commands().subscribe();

    for _ in 0..5 {
        broker.publish_command(create_command("cmd-idempotent", "flow-a")).await.unwrap();
    }
    broker.commands().close();

    let mut count = 0;
    while cursor.next().await.unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 1);
}

#[tokio::test]
async fn task_partition_key_is_execution_id() {
    let task = TaskMessage {
        schema_version: SCHEMA_VERSION,
        execution_id: "exec-42".to_string(),
        flow_id: "flow-a".to_string(),
        context: TaskContext::default(),
        options: ExecutionOptions::default(),
        priority: 0,
        timestamp: 0,
    };
    assert_eq!(task.partition_key(), "exec-42");
    assert_eq!(
        partition_for(task.partition_key(), 8),
        partition_for("exec-42", 8)
    );
}

#[tokio::test]
async fn command_without_execution_id_partitions_by_flow_id() {
    let cmd = create_command("cmd-1", "flow-b");
    assert_eq!(cmd.partition_key(), "flow-b");
}

#[tokio::test]
async fn commands_and_tasks_are_independent_topics() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut command_cursor = broker.commands().subscribe();
    let task_cursor = broker.tasks().subscribe();
    drop(task_cursor);

    broker.publish_command(create_command("cmd-1", "flow-a")).await.unwrap();
    broker.commands().close();

    assert!(command_cursor.next().await.unwrap().is_some());
}
