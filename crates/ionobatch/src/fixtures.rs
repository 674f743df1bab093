//! Record builders shared by the binary's unit tests.

use std::path::Path;

use ionogram_core::{Echo, NoiseSample, Passport, Record, WriteMode};

/// One frequency bin per noise entry.
pub fn record(noise: &[f64], echoes: &[(usize, usize, f64)]) -> Record {
    let freq_n = 1000 + 50 * noise.len();
    let text = format!(
        "Дата: 01.01.2020\n\
         Время начала сеанса: 00:00:00.000\n\
         Трасса зондирования: Иркутск - Торы\n\
         Режим: ВЗ\n\
         Задержка: 1000 мкс\n\
         Начальная частота: 1000 кГц\n\
         Конечная частота: {freq_n} кГц\n\
         Скорость сканирования: 100000 Гц/с\n\
         Полоса анализа: 200 Гц\n\
         Антенна: Дельта\n\
         Номер АЦП: 1\n\
         Дискретность по частоте зондирования: 50 кГц\n\
         Коэффициент усиления: 20 дБ\n\
         Широта пункта приёма: 51.8125 град\n\
         Долгота пункта приёма: 103.0781 град\n\
         Высота пункта приёма: 0.5000 км\n"
    );
    let passport = Passport::parse(&text).unwrap();
    let noise = noise
        .iter()
        .enumerate()
        .map(|(frequency, &level)| NoiseSample { frequency, level })
        .collect();
    let echoes = echoes.iter().map(|&(f, h, a)| Echo::new(f, h, a)).collect();
    Record::from_parts(passport, noise, echoes).unwrap()
}

pub fn write(dir: &Path, name: &str, record: &Record) {
    std::fs::create_dir_all(dir).unwrap();
    record.save(dir.join(name), WriteMode::CreateNew).unwrap();
}
