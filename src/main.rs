//! Demo server: greets on GET, echoes request bodies back otherwise, and
//! logs per-worker request counts once a minute.

use impeller::{Config, Handler, Request, Response, Server, WorkerState};

#[derive(Default)]
struct Stats {
    requests: u64,
    errors: u64,
}

struct Demo;

impl Handler for Demo {
    type Context = Stats;

    fn on_thread_started(&self) -> Stats {
        Stats::default()
    }

    fn on_request(&self, request: &Request, response: &mut Response, worker: &WorkerState<Stats>) {
        {
            let mut slot = worker.lock();
            if let Some(stats) = slot.as_mut() {
                stats.requests += 1;
            }
        }

        match request.method() {
            "GET" => {
                response.add_header("content-type", "text/plain");
                response.set_body(Some(b"hello from impeller\n"));
            }
            _ => match request.body() {
                Some(body) => {
                    response.set_body(Some(body));
                }
                None => {
                    if let Some(stats) = worker.lock().as_mut() {
                        stats.errors += 1;
                    }
                    response.set_status(400);
                    response.set_body(None);
                }
            },
        }
    }

    fn on_timer(&self, interval_secs: u64, workers: &[WorkerState<Stats>]) {
        let mut requests = 0u64;
        let mut errors = 0u64;
        for worker in workers {
            let mut slot = worker.lock();
            if let Some(stats) = slot.as_mut() {
                requests += stats.requests;
                errors += stats.errors;
                stats.requests = 0;
                stats.errors = 0;
            }
        }
        tracing::info!(interval_secs, requests, errors, "stats");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = Config::load();
    tracing::info!(addr = %config.listen_addr, "starting");

    let mut server = Server::new(config, Demo);
    server.add_timer(60);

    {
        let handle = server.handle();
        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::error!(%error, "signal runtime failed, ctrl-c disabled");
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                tracing::info!("shutdown requested");
                handle.stop();
            }
        });
    }

    server.start()
}
