use anyhow::Result;
use async_trait::async_trait;
use hookwork_runtime::host::AgentInfo;
use hookwork_runtime::ChatHost;

/// Chat host for a terminal: prompts are printed for the user to run
pub struct ConsoleChat;

#[async_trait]
impl ChatHost for ConsoleChat {
    async fn send_prompt(&self, prompt: &str) -> Result<()> {
        println!("> {}", prompt);
        Ok(())
    }

    async fn invoke_agent(&self, agent: &AgentInfo, arguments: Option<&str>) -> Result<()> {
        match arguments {
            Some(args) => println!("> @{} {}", agent.name, args),
            None => println!("> @{}", agent.name),
        }
        Ok(())
    }
}
