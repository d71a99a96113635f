use std::io::{self, BufRead, Write};
use std::process::exit;

use log::{Level, LevelFilter, Metadata, Record};
use memchar_kernel::driver::memchar::MEM_SIZE;
use memchar_kernel::filesystem::vfs::file::{File, FileMode};
use memchar_kernel::init::{kernel_exit, kernel_init};
use memchar_kernel::syscall::Syscall;
use system_error::SystemError;

/// 仿printk样式的logger，把内核侧的跟踪日志打到标准输出
struct PrintkLogger;

impl log::Log for PrintkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        return metadata.level() <= Level::Info;
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level = match record.level() {
                Level::Error => "[ ERROR ]",
                Level::Warn => "[ WARN ]",
                Level::Info => "[ INFO ]",
                Level::Debug => "[ DEBUG ]",
                Level::Trace => "[ TRACE ]",
            };
            println!("{} {}", level, record.args());
        }
    }

    fn flush(&self) {}
}

static PRINTK_LOGGER: PrintkLogger = PrintkLogger;

/// 读取一行用户输入。输入流结束时返回None
fn read_line() -> Option<String> {
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line).unwrap_or(0);
    if n == 0 {
        return None;
    }
    return Some(line.trim_end().to_string());
}

/// 把用户输入的字符串写入设备。
///
/// 写缓冲区由调用方持有并显式传入，而不是进程级的全局数组。
fn write_to_device(file: &File, write_buf: &mut [u8]) -> Result<(), SystemError> {
    println!("enter the string to write into the driver:");
    let input = read_line().unwrap_or_default();
    let data = input.as_bytes();

    let len = if data.len() > write_buf.len() {
        println!("input longer than the device buffer, truncating....");
        write_buf.len()
    } else {
        data.len()
    };
    write_buf[..len].copy_from_slice(&data[..len]);

    println!("data writting....");
    Syscall::write(file, write_buf.as_ptr(), len)?;
    println!("writting done....");
    return Ok(());
}

/// 从设备读回整个缓冲区并展示其中的字符串前缀
fn read_from_device(file: &File, read_buf: &mut [u8]) -> Result<(), SystemError> {
    println!("reading the data....");
    Syscall::read(file, read_buf.as_mut_ptr(), read_buf.len())?;
    println!("reading done....");

    let text_end = read_buf
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(read_buf.len());
    println!(
        "data = {}\n",
        String::from_utf8_lossy(&read_buf[..text_end])
    );
    return Ok(());
}

fn main() {
    log::set_logger(&PRINTK_LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Info))
        .expect("logger already installed");

    println!("welcome to the demo of character device driver....");

    // 加载驱动
    if let Err(e) = kernel_init() {
        println!("cannot load the driver.... ({:?})", e);
        exit(1);
    }

    let file = match Syscall::open("/dev/memchar", FileMode::O_RDWR) {
        Ok(file) => file,
        Err(e) => {
            println!("cannot open the device file.... ({:?})", e);
            exit(1);
        }
    };

    // 读写缓冲区属于调用方，按操作显式传入
    let mut write_buf = [0u8; MEM_SIZE];
    let mut read_buf = [0u8; MEM_SIZE];

    loop {
        println!("******please enter your option*******");
        println!("        1. write");
        println!("        2. read");
        println!("        3. exit");
        print!("> ");
        io::stdout().flush().ok();

        let option = match read_line() {
            Some(option) => option,
            None => break,
        };
        match option.as_str() {
            "1" => {
                if let Err(e) = write_to_device(&file, &mut write_buf) {
                    println!("write failed.... ({:?})", e);
                }
            }
            "2" => {
                if let Err(e) = read_from_device(&file, &mut read_buf) {
                    println!("read failed.... ({:?})", e);
                }
            }
            "3" => {
                break;
            }
            _ => {
                println!("enter a valid option = {}", option);
            }
        }
    }

    Syscall::close(file).ok();

    // 卸载驱动
    if let Err(e) = kernel_exit() {
        println!("cannot unload the driver.... ({:?})", e);
        exit(1);
    }
}
