use crate::{config::Config, ffmpeg};
use serde::Serialize;
use sysinfo::System;

#[derive(Serialize, Debug)]
pub struct SystemInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
    pub ffmpeg: String,
    pub ffprobe: String,
}

async fn tool_status(program: &str) -> String {
    ffmpeg::tool_version(program)
        .await
        .unwrap_or_else(|e| format!("not available ({})", e))
}

pub async fn get_system_info(config: &Config) -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu();

    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: system.cpus().len(),
        memory_total_gb: system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        memory_free_gb: system.free_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        ffmpeg: tool_status(&config.media.ffmpeg_bin).await,
        ffprobe: tool_status(&config.media.ffprobe_bin).await,
    }
}

pub async fn print_startup_info(config: &Config) {
    let sys_info = get_system_info(config).await;

    println!("{}", "=".repeat(60));
    println!("🚀 Tubely {} starting", sys_info.version);
    println!("{}", "=".repeat(60));
    println!("  Platform: {} ({})", sys_info.platform, sys_info.arch);
    println!("  CPUs: {}", sys_info.cpus);
    println!(
        "  Memory: {:.2} GB total, {:.2} GB free",
        sys_info.memory_total_gb, sys_info.memory_free_gb
    );
    println!("  FFmpeg: {}", sys_info.ffmpeg);
    println!("  FFprobe: {}", sys_info.ffprobe);
    println!("  Assets Dir: {:?}", config.assets_root);
    println!("  Scratch Dir: {:?}", config.scratch_dir);
    println!("  Bucket: {}", config.storage.s3_bucket);
    println!("  Distribution: {}", config.storage.distribution_url);
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_tools, test_config};

    #[tokio::test]
    async fn test_reports_missing_tools() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.media.ffmpeg_bin = "/nonexistent/ffmpeg".to_string();
        config.media.ffprobe_bin = fake_tools().failing_tool.display().to_string();

        let info = get_system_info(&config).await;
        assert!(info.ffmpeg.starts_with("not available"));
        assert!(info.ffprobe.starts_with("not available"));
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
