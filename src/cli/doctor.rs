//! CLI `doctor` command: print the resolved configuration and key status.

use portfolio_chat::config::{BackendConfig, ChatConfig};

/// Print the resolved configuration and which API keys are available.
pub fn doctor(config: &ChatConfig) {
    println!("Portfolio Chat Health Report");
    println!("============================");
    println!();
    println!("Listen address:    http://{}/api/chat", config.bind_addr());
    println!("Log level:         {}", config.server.log_level);
    println!();
    println!("Generation:");
    print_backend("Primary", &config.generation.primary);
    match &config.generation.fallback {
        Some(fallback) => print_backend("Fallback", fallback),
        None => println!("  Fallback:        (none)"),
    }
    println!("  Max tokens:      {}", config.generation.max_tokens);
    println!();
    println!("Retrieval:");
    let retrieval = &config.retrieval;
    if !retrieval.enabled {
        println!("  Status:          disabled");
    } else {
        let host = if retrieval.index_host.is_empty() {
            "(not set, retrieval will be skipped)"
        } else {
            retrieval.index_host.as_str()
        };
        println!("  Index host:      {host}");
        println!("  Namespaces:      {}", retrieval.namespaces.join(", "));
        println!("  Top K / Top N:   {} / {}", retrieval.top_k, retrieval.top_n);
        println!("  Min rerank:      {}", retrieval.min_rerank_score);
        println!(
            "  Small talk:      {}",
            if retrieval.skip_small_talk { "answered without retrieval" } else { "retrieved" }
        );
        println!("  {:<17}{}", format!("{}:", retrieval.openai_api_key_env), key_status(&retrieval.openai_api_key_env));
        println!("  {:<17}{}", format!("{}:", retrieval.pinecone_api_key_env), key_status(&retrieval.pinecone_api_key_env));
    }
    println!();
    println!(
        "Rate limit:        {} requests / {}s per client",
        config.rate_limit.max_requests, config.rate_limit.window_secs
    );
    println!(
        "Unterminated citation blocks: {}",
        if config.citations.trust_unterminated { "trusted" } else { "ignored" }
    );
}

fn print_backend(label: &str, backend: &BackendConfig) {
    println!(
        "  {:<17}{} ({}) via {}",
        format!("{label}:"),
        backend.name,
        backend.model,
        backend.base_url
    );
    println!(
        "  {:<17}{}",
        format!("{}:", backend.api_key_env),
        key_status(&backend.api_key_env)
    );
}

fn key_status(var: &str) -> &'static str {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => "set",
        _ => "MISSING",
    }
}
