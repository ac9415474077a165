//! 群体编排集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use hive::config::{RuntimeSection, ToolsSection};
    use hive::core::Orchestrator;
    use hive::llm::MockClient;
    use hive::tools::builtin_tools;

    fn runtime() -> RuntimeSection {
        RuntimeSection {
            cycle_delay_ms: 10,
            step_budget: 5,
            ..RuntimeSection::default()
        }
    }

    fn test_tools() -> Arc<hive::tools::ToolRegistry> {
        builtin_tools(&ToolsSection {
            filesystem_root: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            ..ToolsSection::default()
        })
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test]
    async fn test_scripted_main_spawns_sub_and_reports() {
        let llm = Arc::new(MockClient::with_responses([
            r#"{"actions":[{"type":"open_monologue","role":"Scout","goal":"look around"},{"type":"report_status"}]}"#,
        ]));
        let orch = Arc::new(Orchestrator::new(llm.clone(), test_tools(), runtime()));
        let main_id = orch.start("coordinate", true).await;

        // Main + Comms + 脚本生成的 Scout
        let o = orch.clone();
        wait_until(move || o.snapshot().actors.len() == 3).await;

        let snap = orch.snapshot();
        let scout = snap.actors.iter().find(|a| a.role == "Scout").unwrap();
        assert_eq!(scout.parent_id, Some(main_id.clone()));

        // 下一步的 prompt 应携带上一步 report_status 写入邮箱的行
        let l = llm.clone();
        wait_until(move || l.prompts().iter().any(|p| p.contains("[status]"))).await;

        orch.shutdown().await;
        assert!(orch.snapshot().actors.iter().all(|a| !a.running));
    }

    #[tokio::test]
    async fn test_comms_forwards_user_input_to_sink() {
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let orch = Arc::new(
            Orchestrator::new(Arc::new(MockClient::new()), test_tools(), runtime())
                .with_injection_hook(Box::new(move |event, _main| {
                    let sink = sink.clone();
                    Box::pin(async move {
                        sink.lock().push(event.content);
                    })
                })),
        );
        orch.start("listen", true).await;

        orch.send_to_comms("hello there");
        let r = received.clone();
        wait_until(move || r.lock().iter().any(|c| c == "[user] hello there")).await;

        orch.shutdown().await;
    }
}
