use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vtranscoder_rpc::config::Config;
use vtranscoder_rpc::ffmpeg::FfmpegCli;
use vtranscoder_rpc::server::Server;
use vtranscoder_rpc::{Converter, MediaEngine, UploadGate};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("LOG_LEVEL"))
        .init();

    let config = Config::from_env();
    let converter = Arc::new(
        Converter::new(engine(&config)).with_strict_exit(config.strict_transcode),
    );
    let uploads = UploadGate::new(&config.upload_dir);
    info!(upload_dir = %config.upload_dir.display(), "storing uploads");

    let shutdown = {
        let converter = Arc::clone(&converter);
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("cannot listen for shutdown signal: {}", err);
                return;
            }
            info!("shutting down");
            converter.dispose();
        }
    };

    Server::new(converter, uploads, config.convert_timeout)
        .serve(&config.listen, shutdown)
        .await
        .expect("Cannot bind the addr")
}

#[cfg(not(feature = "libav"))]
fn engine(config: &Config) -> Arc<dyn MediaEngine> {
    Arc::new(FfmpegCli::new(&config.ffmpeg_path, &config.ffprobe_path))
}

#[cfg(feature = "libav")]
fn engine(config: &Config) -> Arc<dyn MediaEngine> {
    let cli = FfmpegCli::new(&config.ffmpeg_path, &config.ffprobe_path);
    match vtranscoder_rpc::libav::LibavEngine::new(cli.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!("couldn't init FFmpeg, falling back to ffprobe: {}", err);
            Arc::new(cli)
        }
    }
}
