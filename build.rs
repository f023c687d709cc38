use std::env;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use nalgebra::{Matrix3, Vector3, Vector5};

fn main() {
    let out_dir = &env::var("OUT_DIR").expect("can read OUT_DIR");

    init_pyramid_kernel(out_dir).expect("can init pyramid kernel");
    init_adobe_rgb(out_dir).expect("can init color constants");
}

fn write_const_usize<W: Write>(w: &mut W, name: &str, val: usize) -> io::Result<()> {
    writeln!(w, "pub(crate) const {name}: usize = {val}_usize;")
}

fn write_const_f32_array<W: Write>(w: &mut W, name: &str, vals: &[f64]) -> io::Result<()> {
    write!(w, "pub(crate) const {name}: [f32; {}] = [", vals.len())?;
    for val in vals {
        write!(w, "{}_f32, ", *val as f32)?;
    }
    writeln!(w, "];")
}

fn init_pyramid_kernel(out_path: &str) -> io::Result<()> {
    // Binomial-like 5 tap low pass used by the Laplacian pyramid
    const KERNEL: [f64; 5] = [0.05, 0.25, 0.4, 0.25, 0.05];

    let k = Vector5::from_column_slice(&KERNEL);
    let k2 = k * k.transpose();

    // Sanity check: blurring must not change overall brightness
    assert!((k.sum() - 1.0).abs() < 1E-12f64);
    assert!((k2.sum() - 1.0).abs() < 1E-12f64);

    // Row-major: index (dy + 2) * 5 + (dx + 2)
    let mut taps = Vec::with_capacity(25);
    for row in 0..5 {
        for col in 0..5 {
            taps.push(k2[(row, col)]);
        }
    }

    let file_path = Path::new(out_path).join("pyramid_kernel.rs");
    let mut out_file = File::create(file_path)?;

    write_const_usize(&mut out_file, "KERNEL_RADIUS", KERNEL.len() / 2)?;
    write_const_f32_array(&mut out_file, "KERNEL_2D", &taps)?;

    Ok(())
}

fn init_adobe_rgb(out_path: &str) -> io::Result<()> {
    // Adobe RGB (1998), reference white D65, from http://www.brucelindbloom.com/
    #[rustfmt::skip]
    let to_xyz = Matrix3::from_row_slice(&[
        0.576700, 0.185556, 0.188212,
        0.297361, 0.627355, 0.0752847,
        0.0270328, 0.0706879, 0.991248,
    ]);
    let white = to_xyz * Vector3::new(1.0f64, 1.0, 1.0);

    // Y of the white point is one up to rounding of the published matrix
    assert!((white[1] - 1.0).abs() < 1E-5f64);

    let mut matrix = Vec::with_capacity(9);
    for row in 0..3 {
        for col in 0..3 {
            matrix.push(to_xyz[(row, col)]);
        }
    }

    let file_path = Path::new(out_path).join("adobe_rgb.rs");
    let mut out_file = File::create(file_path)?;

    write_const_f32_array(&mut out_file, "ADOBE_RGB_TO_XYZ", &matrix)?;
    write_const_f32_array(&mut out_file, "REFERENCE_WHITE", white.as_slice())?;

    Ok(())
}
