use memlens_env::{CountingAllocator, MemoryMode, MemorySource, ProcessMemory};

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn main() {
    let source = ProcessMemory;
    println!("Process memory:");
    println!("  Resident: {} bytes (peak {})", source.current(MemoryMode::Allocated), source.peak(MemoryMode::Allocated));
    println!("  In use:   {} bytes (peak {})", source.current(MemoryMode::Used), source.peak(MemoryMode::Used));

    let block = vec![0u8; 8 << 20];
    println!("After 8 MiB allocation:");
    println!("  Resident: {} bytes", source.current(MemoryMode::Allocated));
    println!("  In use:   {} bytes", source.current(MemoryMode::Used));
    drop(block);

    println!("After release:");
    println!("  In use:   {} bytes (peak {})", source.current(MemoryMode::Used), source.peak(MemoryMode::Used));
}
