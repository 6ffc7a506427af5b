use crate::output::print_json;
use integ_core::random::{random_integer, StackPrefix};

pub fn run(count: usize, json: bool) -> anyhow::Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    // Held until printing finishes so the batch is distinct.
    let prefixes: Vec<StackPrefix> = (0..count).map(|_| StackPrefix::allocate()).collect();

    if json {
        let items: Vec<_> = prefixes
            .iter()
            .map(|p| {
                serde_json::json!({
                    "prefix": p.as_str(),
                    "compact": p.compact(),
                })
            })
            .collect();
        print_json(&items)?;
    } else {
        for p in &prefixes {
            println!("{p}");
        }
    }
    Ok(())
}

pub fn port(min: u32, max: u32, json: bool) -> anyhow::Result<()> {
    if min >= max || max > u32::from(u16::MAX) + 1 {
        anyhow::bail!("invalid port range [{min}, {max})");
    }
    let port = random_integer(min, max);
    if json {
        print_json(&serde_json::json!({ "port": port }))?;
    } else {
        println!("{port}");
    }
    Ok(())
}
