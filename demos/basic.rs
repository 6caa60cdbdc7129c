//! Basic breaker usage example

use ringbreaker::Brakes;
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    // Create a breaker with builder API
    let brake: Brakes<u32, String, String> = Brakes::builder("payment_api")
        .wait_threshold(3)
        .threshold(0.5)
        .timeout(Duration::from_secs(1))
        .circuit_duration(Duration::from_secs(2))
        .main_future(|id: u32| async move {
            if id % 2 == 0 {
                Ok(format!("Payment {} accepted", id))
            } else {
                Err(format!("Payment {} declined", id))
            }
        })
        .fallback_future(|id: u32| async move { Ok(format!("Payment {} queued for retry", id)) })
        .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .build();

    println!("Initial state: {}\n", brake.state_name());

    // Simulate successful calls
    println!("--- Successful calls ---");
    for id in [2, 4] {
        match brake.execute(id).await {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", brake.state_name());

    // Simulate failures until the circuit opens
    println!("--- Triggering failures ---");
    for id in [1, 3, 5, 7] {
        match brake.execute(id).await {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", brake.state_name());

    // Calls while open go straight to the fallback
    println!("--- Calling while open ---");
    match brake.execute(6).await {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    let totals = brake.totals();
    println!(
        "Window: {} calls, {} failed, {} short-circuited\n",
        totals.total, totals.failed, totals.short_circuited
    );

    // Wait for the cooldown to close the circuit again
    println!("--- Waiting for cooldown ---");
    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("State after cooldown: {}\n", brake.state_name());

    // Calls after recovery
    println!("--- Calls after recovery ---");
    match brake.execute(8).await {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    println!("State: {}", brake.state_name());
}
