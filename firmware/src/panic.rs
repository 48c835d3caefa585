use core::panic::PanicInfo;

use cortex_m::{asm, interrupt};
use defmt::error;

#[panic_handler]
fn on_panic(info: &PanicInfo) -> ! {
    interrupt::disable();
    if let Some(location) = info.location() {
        error!("panic at {}:{}", location.file(), location.line());
    }
    error!("{}", defmt::Display2Format(&info.message()));
    defmt::flush();
    asm::udf();
}
