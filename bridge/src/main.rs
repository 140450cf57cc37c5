mod bridge;
mod bus;
mod coordinator;
mod host;
mod scheduler;
mod status;
#[cfg(test)]
mod testing;
mod vehicle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
