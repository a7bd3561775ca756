use gembridge_pipeline::resolve_model;

/// Print the picker category and option keywords a model identifier maps to.
pub fn run(model: &str) -> anyhow::Result<()> {
    let spec = resolve_model(model)?;

    println!("Model:    {}", model);
    println!("Category: {}", spec.category.label());
    if spec.keywords.is_empty() {
        println!("Keywords: (none)");
    } else {
        println!("Keywords: {}", spec.keywords.join(", "));
    }
    Ok(())
}
