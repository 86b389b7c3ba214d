//! One-shot model management commands backed by `lms`.

use std::error::Error;

use crate::lms::{format_size, CommandRunner, LmsClient, ServerStatus};

pub async fn list_models(estimates: bool) -> Result<(), Box<dyn Error>> {
    print!("{}", render_model_listing(&LmsClient::new(), estimates).await?);
    Ok(())
}

pub async fn render_model_listing<R: CommandRunner>(
    lms: &LmsClient<R>,
    estimates: bool,
) -> Result<String, Box<dyn Error>> {
    let loaded = lms.loaded_models().await?;
    let downloaded = if estimates {
        lms.downloaded_models_with_estimates().await?
    } else {
        lms.downloaded_models().await?
    };

    let mut out = String::new();
    out.push_str("🤖 Loaded models\n");
    if loaded.is_empty() {
        out.push_str("  (none)\n");
    }
    for model in &loaded {
        out.push_str(&format!(
            "  • {} [{}] ctx {}\n",
            model.identifier, model.status, model.context_length
        ));
    }

    out.push_str("\n📦 Downloaded models\n");
    if downloaded.is_empty() {
        out.push_str("  (none)\n");
    }
    for model in &downloaded {
        let marker = if estimates && !model.can_load {
            " ⚠ may not fit"
        } else {
            ""
        };
        out.push_str(&format!(
            "  • {} ({}){marker}\n",
            model.model_key,
            format_size(model.size_bytes)
        ));
    }
    Ok(out)
}

pub async fn load_model(model: &str) -> Result<(), Box<dyn Error>> {
    let output = LmsClient::new().load(model).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    println!("✅ Loaded {model}");
    Ok(())
}

pub async fn unload_models(model: Option<&str>, all: bool) -> Result<(), Box<dyn Error>> {
    let lms = LmsClient::new();
    match (model, all) {
        (_, true) => {
            lms.unload_all().await?;
            println!("✅ Unloaded all models");
        }
        (Some(model), false) => {
            lms.unload(model).await?;
            println!("✅ Unloaded {model}");
        }
        (None, false) => return Err("specify a model to unload or pass --all".into()),
    }
    Ok(())
}

pub async fn show_status() -> Result<(), Box<dyn Error>> {
    let status = LmsClient::new().status().await?;
    println!("LM Studio server: {}", status.as_str());
    if status == ServerStatus::Off {
        println!("Start it with `lms server start`.");
    }
    Ok(())
}
